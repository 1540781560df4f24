//! Leaf value coercion
//!
//! Typed getters resolve a leaf value first and coerce second, so a missing
//! key (`NotFound`) is always distinguishable from a present-but-wrong-typed
//! value (`TypeConversion`). The rules are deliberately explicit rather than
//! truthiness-based:
//!
//! - **int**: integral JSON numbers, strings that parse as `i64`, bools as
//!   0/1. Fractional floats fail instead of truncating.
//! - **float**: any JSON number, strings that parse as `f64`, bools as
//!   0.0/1.0.
//! - **bool**: JSON bools, numbers by `!= 0`, the strings
//!   `"true"`/`"false"`/`"1"`/`"0"` (ASCII case-insensitive).
//! - **string**: strings verbatim, numbers and bools as their JSON text.
//! - **list**: arrays only, no coercion.

use crate::{Error, Result};
use serde_json::Value;

/// Renders a value the way log lines and error messages show it:
/// strings bare, everything else as its JSON text.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn conversion(value: &Value, target: &'static str) -> Error {
    Error::TypeConversion {
        value: display(value),
        target,
    }
}

/// Coerces a leaf value to an integer.
pub fn to_int(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(conversion(value, "int")),
            }
        }
        Value::String(s) => s.trim().parse().map_err(|_| conversion(value, "int")),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(conversion(value, "int")),
    }
}

/// Coerces a leaf value to a float.
pub fn to_float(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| conversion(value, "float")),
        Value::String(s) => s.trim().parse().map_err(|_| conversion(value, "float")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(conversion(value, "float")),
    }
}

/// Coerces a leaf value to a bool.
pub fn to_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(conversion(value, "bool")),
        },
        _ => Err(conversion(value, "bool")),
    }
}

/// Coerces a leaf value to a string.
pub fn to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(value.to_string()),
        _ => Err(conversion(value, "string")),
    }
}

/// Returns a leaf value as a list.
pub fn to_list(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(conversion(value, "list")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(42), 42)]
    #[case(json!(-7), -7)]
    #[case(json!(3.0), 3)]
    #[case(json!("15"), 15)]
    #[case(json!(" 8 "), 8)]
    #[case(json!(true), 1)]
    #[case(json!(false), 0)]
    fn int_coercions(#[case] value: Value, #[case] expected: i64) {
        assert_eq!(to_int(&value).unwrap(), expected);
    }

    #[rstest]
    #[case(json!(3.7))]
    #[case(json!("3.7"))]
    #[case(json!("abc"))]
    #[case(json!(null))]
    #[case(json!([1, 2]))]
    fn int_rejections(#[case] value: Value) {
        assert!(matches!(
            to_int(&value),
            Err(Error::TypeConversion { target: "int", .. })
        ));
    }

    #[rstest]
    #[case(json!(0.5), 0.5)]
    #[case(json!(4), 4.0)]
    #[case(json!("2.25"), 2.25)]
    #[case(json!(true), 1.0)]
    fn float_coercions(#[case] value: Value, #[case] expected: f64) {
        assert_eq!(to_float(&value).unwrap(), expected);
    }

    #[rstest]
    #[case(json!(true), true)]
    #[case(json!(false), false)]
    #[case(json!(1), true)]
    #[case(json!(0), false)]
    #[case(json!(0.0), false)]
    #[case(json!("true"), true)]
    #[case(json!("False"), false)]
    #[case(json!("1"), true)]
    #[case(json!("0"), false)]
    fn bool_coercions(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(to_bool(&value).unwrap(), expected);
    }

    #[test]
    fn bool_rejects_arbitrary_strings() {
        assert!(to_bool(&json!("yes")).is_err());
        assert!(to_bool(&json!("")).is_err());
        assert!(to_bool(&json!(null)).is_err());
    }

    #[test]
    fn string_coercions() {
        assert_eq!(to_string(&json!("hi")).unwrap(), "hi");
        assert_eq!(to_string(&json!(12)).unwrap(), "12");
        assert_eq!(to_string(&json!(0.5)).unwrap(), "0.5");
        assert_eq!(to_string(&json!(true)).unwrap(), "true");
        assert!(to_string(&json!([1])).is_err());
        assert!(to_string(&json!({"a": 1})).is_err());
    }

    #[test]
    fn list_requires_array() {
        assert_eq!(to_list(&json!([1, "a"])).unwrap(), vec![json!(1), json!("a")]);
        assert!(to_list(&json!("not-a-list")).is_err());
    }

    #[test]
    fn display_renders_strings_bare() {
        assert_eq!(display(&json!("plain")), "plain");
        assert_eq!(display(&json!(3)), "3");
        assert_eq!(display(&json!([1, 2])), "[1,2]");
    }
}
