//! Record normalizer for multi-valued attribute fields
//!
//! Multi-valued attributes arrive as text holding a JSON list of tagged
//! objects, e.g. `[{"mal_id": 1, "type": "manga", "name": "Action"}]`.
//! Some sources emit bare names instead of objects, and plenty of rows carry
//! nothing usable at all. Nothing in here fails: anything unparsable is an
//! empty list.

use serde_json::Value;
use std::collections::HashSet;

/// One element of a multi-valued attribute after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Tagged object carrying a `name` field
    Named(String),
    /// Element that is itself the name
    Scalar(String),
}

impl AttributeValue {
    /// Classify a parsed list element. Falsy elements (null, false, 0, empty
    /// text) and elements with no usable name yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => map.get("name").and_then(name_text).map(Self::Named),
            Value::String(_) | Value::Number(_) => name_text(value).map(Self::Scalar),
            Value::Null | Value::Bool(_) | Value::Array(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) | Self::Scalar(name) => name,
        }
    }

    pub fn into_name(self) -> String {
        match self {
            Self::Named(name) | Self::Scalar(name) => name,
        }
    }
}

fn name_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.as_f64() == Some(0.0) => return None,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse a raw encoding into its list elements
///
/// Returns an empty list for `None`, text that does not start with `[`,
/// invalid JSON, and JSON that is not a list.
pub fn parse_tagged_list(raw: Option<&str>) -> Vec<Value> {
    let Some(raw) = raw.map(str::trim) else {
        return Vec::new();
    };
    if !raw.starts_with('[') {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Extract names from parsed elements, preserving order
pub fn extract_names(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(AttributeValue::from_json)
        .map(AttributeValue::into_name)
        .collect()
}

/// Parse and extract in one step; the form every dimension uses
pub fn normalize_names(raw: Option<&str>) -> Vec<String> {
    extract_names(&parse_tagged_list(raw))
}

/// First listed value is the primary one, the rest are secondary.
///
/// Secondary values are distinct, in listed order, and never repeat the
/// primary value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimarySplit<'a> {
    pub primary: Option<&'a str>,
    pub secondary: Vec<&'a str>,
}

pub fn split_primary(names: &[String]) -> PrimarySplit<'_> {
    let Some((first, rest)) = names.split_first() else {
        return PrimarySplit {
            primary: None,
            secondary: Vec::new(),
        };
    };

    let mut seen = HashSet::from([first.as_str()]);
    let secondary = rest
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect();

    PrimarySplit {
        primary: Some(first.as_str()),
        secondary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_objects_yield_names_in_order() {
        let raw = r#"[{"mal_id": 1, "type": "manga", "name": "Action"}, {"name": "Drama"}]"#;
        assert_eq!(normalize_names(Some(raw)), vec!["Action", "Drama"]);
    }

    #[test]
    fn test_bare_names_pass_through() {
        assert_eq!(
            normalize_names(Some(r#"["Shounen", {"name": "Seinen"}, 42]"#)),
            vec!["Shounen", "Seinen", "42"]
        );
    }

    #[test]
    fn test_malformed_encodings_are_empty() {
        for raw in [
            None,
            Some(""),
            Some("None"),
            Some("nan"),
            Some(r#"[{"name": "Action"}"#),
            Some("[{'name': 'Action'}]"),
            Some(r#"{"name": "Action"}"#),
        ] {
            assert!(normalize_names(raw).is_empty(), "expected empty for {:?}", raw);
        }
    }

    #[test]
    fn test_falsy_and_unnamed_elements_dropped() {
        let values = vec![
            json!(null),
            json!(false),
            json!(0),
            json!(""),
            json!("   "),
            json!({"mal_id": 3}),
            json!({"name": null}),
            json!([1, 2]),
            json!({"name": " Romance "}),
        ];
        assert_eq!(extract_names(&values), vec!["Romance"]);
    }

    #[test]
    fn test_attribute_value_variants() {
        assert_eq!(
            AttributeValue::from_json(&json!({"name": "Action"})),
            Some(AttributeValue::Named("Action".to_string()))
        );
        assert_eq!(
            AttributeValue::from_json(&json!("Action")),
            Some(AttributeValue::Scalar("Action".to_string()))
        );
        assert_eq!(AttributeValue::Named("x".into()).name(), "x");
    }

    #[test]
    fn test_split_primary() {
        let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let split = split_primary(&names);
        assert_eq!(split.primary, Some("A"));
        assert_eq!(split.secondary, vec!["B", "C"]);

        let single = vec!["A".to_string()];
        assert!(split_primary(&single).secondary.is_empty());

        let repeated: Vec<String> = ["A", "B", "A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let split = split_primary(&repeated);
        assert_eq!(split.primary, Some("A"));
        assert_eq!(split.secondary, vec!["B", "C"]);

        let only_primary = vec!["A".to_string(), "A".to_string()];
        assert!(split_primary(&only_primary).secondary.is_empty());

        let empty: Vec<String> = Vec::new();
        let split = split_primary(&empty);
        assert_eq!(split.primary, None);
        assert!(split.secondary.is_empty());
    }
}
