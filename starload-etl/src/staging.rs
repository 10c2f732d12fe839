//! Raw CSV staging
//!
//! Copies a CSV file verbatim into a flat table, one TEXT/INTEGER/REAL/
//! BOOLEAN column per header. The table is dropped and recreated on every
//! call and all rows go in under one transaction, so a failed load leaves
//! no partial table contents behind.

use crate::schema::star_schema;
use sqlx::SqlitePool;
use starload_common::{Error, Result};
use std::path::Path;
use tracing::{debug, info};

/// Storage class inferred for a staged column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Boolean => "BOOLEAN",
            Self::Text => "TEXT",
        }
    }

    /// Narrowest type every non-empty value fits. An all-empty column is TEXT.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut integer = true;
        let mut real = true;
        let mut boolean = true;
        let mut any = false;

        for value in values.into_iter().map(str::trim).filter(|v| !v.is_empty()) {
            any = true;
            integer &= value.parse::<i64>().is_ok();
            real &= value.parse::<f64>().is_ok();
            boolean &= parse_bool(value).is_some();
        }

        match (any, integer, real, boolean) {
            (false, ..) => Self::Text,
            (true, true, ..) => Self::Integer,
            (true, _, true, _) => Self::Real,
            (true, _, _, true) => Self::Boolean,
            _ => Self::Text,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Table names must be plain identifiers outside the star schema
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(Error::InvalidInput(format!("invalid table name '{}'", name)));
    }
    if star_schema()
        .iter()
        .any(|table| table.name.eq_ignore_ascii_case(name))
    {
        return Err(Error::InvalidInput(format!(
            "table '{}' belongs to the star schema",
            name
        )));
    }
    Ok(())
}

/// Quote a column name taken from a CSV header
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Load `path` into `table`, replacing it. Returns the number of rows written.
pub async fn stage_csv(pool: &SqlitePool, path: &Path, table: &str) -> Result<u64> {
    validate_table_name(table)?;

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() || headers.iter().any(String::is_empty) {
        return Err(Error::InvalidInput(format!(
            "{} has an empty column header",
            path.display()
        )));
    }

    let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    let types: Vec<ColumnType> = (0..headers.len())
        .map(|i| ColumnType::infer(rows.iter().filter_map(|row| row.get(i))))
        .collect();

    let column_defs: Vec<String> = headers
        .iter()
        .zip(&types)
        .map(|(name, ty)| format!("{} {}", quote_identifier(name), ty.sql()))
        .collect();
    let column_names: Vec<String> = headers.iter().map(|h| quote_identifier(h)).collect();
    let placeholders = vec!["?"; headers.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        column_names.join(", "),
        placeholders
    );

    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("CREATE TABLE {} ({})", table, column_defs.join(", ")))
        .execute(&mut *tx)
        .await?;
    debug!("Created staging table {} with {} columns", table, headers.len());

    for row in &rows {
        let mut query = sqlx::query(&insert_sql);
        for (i, ty) in types.iter().enumerate() {
            let cell = row.get(i).map(str::trim).filter(|v| !v.is_empty());
            query = match ty {
                ColumnType::Integer => query.bind(cell.and_then(|v| v.parse::<i64>().ok())),
                ColumnType::Real => query.bind(cell.and_then(|v| v.parse::<f64>().ok())),
                ColumnType::Boolean => query.bind(cell.and_then(parse_bool)),
                ColumnType::Text => query.bind(cell.map(str::to_string)),
            };
        }
        query.execute(&mut *tx).await?;
    }

    tx.commit().await?;
    info!("Staged {} rows from {} into {}", rows.len(), path.display(), table);
    Ok(rows.len() as u64)
}
