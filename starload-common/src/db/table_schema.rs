//! Declarative table definitions
//!
//! Tables are described as data and rendered to `CREATE TABLE` DDL, so the
//! column list, uniqueness constraints and foreign keys live in one place.
//!
//! ```rust,ignore
//! let genres = TableDefinition::new("dim_genres")
//!     .column(ColumnDefinition::new("genre_id", "INTEGER").primary_key().autoincrement())
//!     .column(ColumnDefinition::new("genre_name", "TEXT").not_null().unique());
//!
//! sqlx::query(&genres.create_sql()).execute(&pool).await?;
//! ```

use crate::Result;
use sqlx::{Row, SqlitePool};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "REAL", "DATE", "BOOLEAN")
    pub sql_type: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// PRIMARY KEY constraint (single-column key)
    pub primary_key: bool,
    /// AUTOINCREMENT (only meaningful on an INTEGER PRIMARY KEY)
    pub autoincrement: bool,
    /// UNIQUE constraint
    pub unique: bool,
    /// DEFAULT value
    pub default_value: Option<String>,
    /// REFERENCES target as (table, column)
    pub references: Option<(String, String)>,
}

impl ColumnDefinition {
    /// Create new column definition
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
            unique: false,
            default_value: None,
            references: None,
        }
    }

    /// Mark column as PRIMARY KEY
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Store-assigned, never reused key values
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Mark column as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark column as UNIQUE
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set DEFAULT value
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Foreign key to `table(column)`
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some((table.into(), column.into()));
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some((table, column)) = &self.references {
            sql.push_str(&format!(" REFERENCES {}({})", table, column));
        }
        sql
    }
}

/// One table: columns in creation order plus an optional composite key
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Composite PRIMARY KEY; empty when a column carries the key itself
    pub composite_key: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            composite_key: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn composite_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Names of tables this one references
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|(t, _)| t.as_str()))
            .filter(|t| *t != self.name)
            .collect();
        deps.dedup();
        deps
    }

    /// Render `CREATE TABLE` DDL
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDefinition::to_sql).collect();
        if !self.composite_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", self.composite_key.join(", ")));
        }
        format!("CREATE TABLE {} (\n    {}\n)", self.name, parts.join(",\n    "))
    }

    /// Render `DROP TABLE IF EXISTS` DDL
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }
}

/// Read actual column names of a table (PRAGMA table_info), in table order
pub async fn introspect_columns(pool: &SqlitePool, table_name: &str) -> Result<Vec<String>> {
    let query = format!("PRAGMA table_info({})", table_name);
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    let mut columns: Vec<(i64, String)> = rows
        .iter()
        .map(|row| (row.get::<i64, _>("cid"), row.get::<String, _>("name")))
        .collect();
    columns.sort_by_key(|(cid, _)| *cid);

    Ok(columns.into_iter().map(|(_, name)| name).collect())
}
