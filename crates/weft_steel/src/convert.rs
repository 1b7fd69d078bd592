//! Conversion between node values and steel values.

use steel::{SteelVal, gc::Gc};
use thiserror::Error;
use weft_core::node::Value;

/// A value that has no representation on the other side.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConvertError {
    #[error("cannot represent non-finite number `{0}` as a value")]
    NonFinite(f64),
    #[error("no value representation for `{0}`")]
    Unsupported(String),
}

/// Convert a node value into a steel value.
///
/// Objects become hashmaps keyed by strings, arrays become lists and `null`
/// becomes void.
pub fn to_steel(value: &Value) -> Result<SteelVal, ConvertError> {
    let val = match value {
        Value::Null => SteelVal::Void,
        Value::Bool(b) => SteelVal::BoolV(*b),
        Value::Number(n) => match n.as_i64().and_then(|n| isize::try_from(n).ok()) {
            Some(n) => SteelVal::IntV(n),
            None => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| ConvertError::Unsupported(n.to_string()))?;
                SteelVal::NumV(n)
            }
        },
        Value::String(s) => SteelVal::StringV(s.as_str().into()),
        Value::Array(items) => {
            let items = items.iter().map(to_steel).collect::<Result<Vec<_>, _>>()?;
            SteelVal::ListV(items.into_iter().collect())
        }
        Value::Object(entries) => {
            let SteelVal::HashMapV(mut map) = SteelVal::empty_hashmap() else {
                return Err(ConvertError::Unsupported(value.to_string()));
            };
            for (key, value) in entries {
                let key = SteelVal::StringV(key.as_str().into());
                map = Gc::new(map.update(key, to_steel(value)?)).into();
            }
            SteelVal::HashMapV(map)
        }
    };
    Ok(val)
}

/// Convert a steel value into a node value.
pub fn to_json(val: &SteelVal) -> Result<Value, ConvertError> {
    let value = match val {
        SteelVal::Void => Value::Null,
        SteelVal::BoolV(b) => Value::Bool(*b),
        SteelVal::IntV(n) => Value::from(*n as i64),
        SteelVal::NumV(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .ok_or(ConvertError::NonFinite(*n))?,
        SteelVal::CharV(c) => Value::String(c.to_string()),
        SteelVal::StringV(s) | SteelVal::SymbolV(s) => Value::String(s.to_string()),
        SteelVal::ListV(items) => items.iter().map(to_json).collect::<Result<_, _>>()?,
        SteelVal::VectorV(items) => items.iter().map(to_json).collect::<Result<_, _>>()?,
        SteelVal::HashMapV(map) => {
            let mut entries = weft_core::node::Values::new();
            for (key, value) in map.iter() {
                entries.insert(text(key), to_json(value)?);
            }
            Value::Object(entries)
        }
        other => return Err(ConvertError::Unsupported(other.to_string())),
    };
    Ok(value)
}

/// Render a steel value as plain text, without quoting strings.
pub fn text(val: &SteelVal) -> String {
    match val {
        SteelVal::StringV(s) | SteelVal::SymbolV(s) => s.to_string(),
        other => other.to_string(),
    }
}

/// Interpret a steel value as a number, if it is one.
pub fn number(val: &SteelVal) -> Option<f64> {
    match val {
        SteelVal::IntV(n) => Some(*n as f64),
        SteelVal::NumV(n) => Some(*n),
        _ => None,
    }
}
