//! Extraction of numbers and category keys from JSON cells.

use serde_json::Value;

use crate::{MlErr, Result};

/// Whether a cell counts as empty: absent, `null` or a blank string.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Reads a cell as a number, accepting numbers, numeric strings and booleans.
///
/// # Arguments
/// * `field` - The column name, used in the error.
/// * `value` - The cell.
///
/// # Returns
/// The number or `NotNumeric`.
pub fn to_number(field: &str, value: Option<&Value>) -> Result<f32> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1. } else { 0. }),
        _ => None,
    };

    number
        .map(|n| n as f32)
        .ok_or_else(|| MlErr::NotNumeric {
            field: field.to_string(),
            value: value.map(Value::to_string).unwrap_or_else(|| "null".into()),
        })
}

/// The lookup key of a categorical cell, so `1` and `"1"` name the same category.
pub fn category_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_from_many_shapes() {
        assert_eq!(to_number("x", Some(&json!(2.5))).unwrap(), 2.5);
        assert_eq!(to_number("x", Some(&json!(" 4 "))).unwrap(), 4.0);
        assert_eq!(to_number("x", Some(&json!(true))).unwrap(), 1.0);
        assert!(matches!(
            to_number("x", Some(&json!("red"))),
            Err(MlErr::NotNumeric { ref field, .. }) if field == "x"
        ));
        assert!(to_number("x", None).is_err());
    }

    #[test]
    fn missing_cells() {
        assert!(is_missing(None));
        assert!(is_missing(Some(&Value::Null)));
        assert!(is_missing(Some(&json!("  "))));
        assert!(!is_missing(Some(&json!(0))));
        assert!(!is_missing(Some(&json!(false))));
    }

    #[test]
    fn keys_unify_numbers_and_strings() {
        assert_eq!(category_key(&json!(1)), category_key(&json!("1")));
        assert_ne!(category_key(&json!("a")), category_key(&json!("b")));
    }
}
