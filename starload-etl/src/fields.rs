//! Row-level field parsing
//!
//! Every typed value in a row is parsed here. A bad value yields a
//! [`SkipReason`] naming the field; the caller skips the row, logs it and
//! moves on.

use crate::dimensions::Dimension;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use starload_common::Error;
use thiserror::Error;

/// Why a row (or a single association) was left out of a stage
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("missing external_id")]
    MissingExternalId,

    #[error("malformed numeric value in {field}: {value:?}")]
    MalformedNumeric { field: &'static str, value: String },

    #[error("malformed date in {field}: {value:?}")]
    MalformedDate { field: &'static str, value: String },

    #[error("malformed boolean in {field}: {value:?}")]
    MalformedBool { field: &'static str, value: String },

    #[error("external_id {external_id} has no entity dimension row")]
    UnknownEntity { external_id: i64 },

    #[error("{dimension} name {name:?} not found in dimension table")]
    UnresolvedName { dimension: Dimension, name: String },

    #[error("store rejected row: {0}")]
    Store(String),
}

impl SkipReason {
    /// Split a store error into a row-level skip (constraint violations and
    /// other statement errors) or a fatal error (pool, I/O, protocol).
    pub fn from_store_error(error: sqlx::Error) -> Result<Self, Error> {
        match error {
            sqlx::Error::Database(db) => Ok(Self::Store(db.message().to_string())),
            other => Err(Error::Database(other)),
        }
    }
}

type FieldResult<T> = Result<Option<T>, SkipReason>;

const EXACT_FLOAT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Dataframe exports spell a missing number as `nan`
fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan"))
}

/// External identifier; required
pub fn parse_external_id(raw: Option<&str>) -> Result<i64, SkipReason> {
    parse_int("external_id", raw)?.ok_or(SkipReason::MissingExternalId)
}

/// Integer, accepting integral floats such as `"12.0"`
pub fn parse_int(field: &'static str, raw: Option<&str>) -> FieldResult<i64> {
    let Some(text) = present(raw) else {
        return Ok(None);
    };
    if let Ok(value) = text.parse::<i64>() {
        return Ok(Some(value));
    }
    // Past 2^53 a float no longer holds every integer exactly
    match text.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.abs() < EXACT_FLOAT_LIMIT => {
            Ok(Some(value as i64))
        }
        _ => Err(SkipReason::MalformedNumeric {
            field,
            value: text.to_string(),
        }),
    }
}

pub fn parse_float(field: &'static str, raw: Option<&str>) -> FieldResult<f64> {
    let Some(text) = present(raw) else {
        return Ok(None);
    };
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(SkipReason::MalformedNumeric {
            field,
            value: text.to_string(),
        }),
    }
}

/// Calendar date from an RFC 3339 timestamp, a naive timestamp or a bare date
pub fn parse_date(field: &'static str, raw: Option<&str>) -> FieldResult<NaiveDate> {
    let Some(text) = present(raw) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(ts.date_naive()));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(ts.date()));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| SkipReason::MalformedDate {
            field,
            value: text.to_string(),
        })
}

pub fn parse_bool(field: &'static str, raw: Option<&str>) -> FieldResult<bool> {
    let Some(text) = present(raw) else {
        return Ok(None);
    };
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" => Ok(Some(true)),
        "false" | "0" | "0.0" => Ok(Some(false)),
        _ => Err(SkipReason::MalformedBool {
            field,
            value: text.to_string(),
        }),
    }
}

/// Trimmed text; empty becomes `None`
pub fn text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_accepts_integral_floats() {
        assert_eq!(parse_int("volumes", Some("12")), Ok(Some(12)));
        assert_eq!(parse_int("volumes", Some(" 12.0 ")), Ok(Some(12)));
        assert_eq!(parse_int("volumes", Some("")), Ok(None));
        assert_eq!(parse_int("volumes", Some("NaN")), Ok(None));
        assert_eq!(parse_int("volumes", None), Ok(None));
        assert_eq!(
            parse_int("volumes", Some("12.5")),
            Err(SkipReason::MalformedNumeric {
                field: "volumes",
                value: "12.5".to_string()
            })
        );
        assert!(parse_int("volumes", Some("twelve")).is_err());
    }

    #[test]
    fn test_parse_int_rejects_values_it_cannot_hold() {
        assert_eq!(
            parse_int("members", Some("9223372036854775807")),
            Ok(Some(i64::MAX))
        );
        assert!(matches!(
            parse_int("members", Some("9223372036854775808")),
            Err(SkipReason::MalformedNumeric { field: "members", .. })
        ));
        assert!(parse_int("members", Some("-9223372036854775809")).is_err());
        assert!(parse_int("members", Some("9007199254740993.0")).is_err());
        assert!(parse_int("members", Some("1e300")).is_err());
        assert_eq!(
            parse_int("members", Some("9007199254740991.0")),
            Ok(Some(9_007_199_254_740_991))
        );
    }

    #[tokio::test]
    async fn test_store_errors_split_row_level_from_fatal() {
        let pool = starload_common::db::connect(&starload_common::ConnectionConfig::in_memory())
            .await
            .unwrap();
        crate::schema::reset_schema(&pool).await.unwrap();

        // no such entity or genre; the foreign keys reject it
        let dangling = sqlx::query(
            "INSERT INTO entity_secondary_category (entity_info_id, genre_id) VALUES (7, 8)",
        )
        .execute(&pool)
        .await
        .unwrap_err();
        assert!(matches!(
            SkipReason::from_store_error(dangling),
            Ok(SkipReason::Store(_))
        ));

        assert!(matches!(
            SkipReason::from_store_error(sqlx::Error::PoolTimedOut),
            Err(Error::Database(sqlx::Error::PoolTimedOut))
        ));
    }

    #[test]
    fn test_external_id_required() {
        assert_eq!(parse_external_id(Some("42")), Ok(42));
        assert_eq!(parse_external_id(None), Err(SkipReason::MissingExternalId));
        assert!(matches!(
            parse_external_id(Some("abc")),
            Err(SkipReason::MalformedNumeric { field: "external_id", .. })
        ));
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("score", Some("8.75")), Ok(Some(8.75)));
        assert_eq!(parse_float("score", Some("nan")), Ok(None));
        assert!(parse_float("score", Some("inf")).is_err());
        assert!(parse_float("score", Some("high")).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(1989, 8, 25);
        assert_eq!(
            parse_date("published_from", Some("1989-08-25T00:00:00+00:00")),
            Ok(expected)
        );
        assert_eq!(parse_date("published_from", Some("1989-08-25 13:45:00")), Ok(expected));
        assert_eq!(parse_date("published_from", Some("1989-08-25")), Ok(expected));
        assert_eq!(parse_date("published_from", Some("")), Ok(None));
        assert!(matches!(
            parse_date("published_to", Some("25/08/1989")),
            Err(SkipReason::MalformedDate { field: "published_to", .. })
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("approved", Some("True")), Ok(Some(true)));
        assert_eq!(parse_bool("approved", Some("0")), Ok(Some(false)));
        assert_eq!(parse_bool("approved", None), Ok(None));
        assert!(parse_bool("approved", Some("maybe")).is_err());
    }

    #[test]
    fn test_text_trims_and_drops_empty() {
        assert_eq!(text(Some("  Berserk ")), Some("Berserk".to_string()));
        assert_eq!(text(Some("   ")), None);
        assert_eq!(text(None), None);
    }
}
