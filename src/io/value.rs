//! Value serialization and coercion.
//!
//! Raw twin property values are JSON. They are serialized into artifact cells
//! by a [`ValueFormatter`] and coerced towards the column's declared
//! [`StorageType`] on a best-effort basis: values that cannot be coerced are
//! passed through in their formatted form and left to the loader's schema
//! enforcement.

use crate::models::StorageType;
use crate::storage::cypher::quote_string;
use serde_json::Value;

/// Converts raw values into their canonical string form.
pub trait ValueFormatter {
    /// Serializes a value.
    fn format(&self, value: &Value) -> String;
}

/// Default formatter.
///
/// | Value | Output |
/// |-------|--------|
/// | `null` | empty string |
/// | boolean | `true` / `false` |
/// | number | literal form |
/// | string | the string itself |
/// | array | list literal, e.g. `[1,'a',true]` |
/// | object | compact JSON |
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueFormatter;

impl DefaultValueFormatter {
    fn list_element(value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote_string(s),
            Value::Array(items) => Self::list(items),
            Value::Object(_) => quote_string(&value.to_string()),
        }
    }

    fn list(items: &[Value]) -> String {
        let elements: Vec<String> = items.iter().map(Self::list_element).collect();
        format!("[{}]", elements.join(","))
    }
}

impl ValueFormatter for DefaultValueFormatter {
    fn format(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(items) => Self::list(items),
            Value::Object(_) => value.to_string(),
        }
    }
}

/// Serializes `value` for a column declared as `storage_type`.
///
/// Absent and `null` values become empty cells.
pub fn coerce<F: ValueFormatter + ?Sized>(
    value: Option<&Value>,
    storage_type: StorageType,
    formatter: &F,
) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if value.is_null() {
        return String::new();
    }

    let coerced = match storage_type {
        StorageType::Integer | StorageType::Long => coerce_integer(value),
        StorageType::Double | StorageType::Float => coerce_float(value),
        StorageType::Boolean => coerce_boolean(value),
        StorageType::Array if !value.is_array() => {
            Some(formatter.format(&Value::Array(vec![value.clone()])))
        },
        StorageType::String
        | StorageType::Array
        | StorageType::Id
        | StorageType::StartId
        | StorageType::EndId => None,
    };
    coerced.unwrap_or_else(|| formatter.format(value))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn coerce_integer(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| (f as i64).to_string()),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| i.to_string()),
        Value::Bool(b) => Some(i64::from(*b).to_string()),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|_| s.trim().to_string()),
        _ => None,
    }
}

fn coerce_boolean(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some("true".to_string()),
            "false" | "0" | "no" => Some("false".to_string()),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some("false".to_string()),
            Some(1) => Some("true".to_string()),
            _ => None,
        },
        _ => None,
    }
}
