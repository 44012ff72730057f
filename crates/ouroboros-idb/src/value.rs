//! Key and value types accepted by the host engine
//!
//! The host stores structured values and orders records by key. Only a
//! closed set of kinds crosses the adapter boundary; anything else is
//! rejected before a request is issued.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Value types the host can store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string
    Text(String),
    /// Boolean (storable, but never a valid key)
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit unsigned integer
    UInt(u64),
    /// 64-bit floating point
    Float(f64),
    /// Ordered list of values
    List(Vec<Value>),
    /// Record with named fields, addressable through key paths
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short kind name used in type errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Numeric view of the value, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            Value::Float(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// Check that the value can be used as a record key.
    ///
    /// Keys are text, non-NaN numbers, or lists of keys.
    pub fn validate_key(&self) -> Result<(), TypeError> {
        match self {
            Value::Text(_) | Value::Int(_) | Value::UInt(_) => Ok(()),
            Value::Float(n) if n.is_nan() => Err(TypeError::new("NaN")),
            Value::Float(_) => Ok(()),
            Value::List(items) => items.iter().try_for_each(Value::validate_key),
            Value::Bool(_) | Value::Map(_) => Err(TypeError::new(self.kind())),
        }
    }

    /// Resolve a dotted key path (`"profile.email"`) against a record.
    ///
    /// An empty path resolves to the value itself.
    pub fn lookup(&self, key_path: &str) -> Option<&Value> {
        if key_path.is_empty() {
            return Some(self);
        }

        key_path.split('.').try_fold(self, |current, field| match current {
            Value::Map(fields) => fields.get(field),
            _ => None,
        })
    }

    /// Total key order used by the host: numbers < text < lists.
    ///
    /// All numeric kinds compare as doubles, so `Int(1)` and `Float(1.0)`
    /// address the same record.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        fn rank(value: &Value) -> u8 {
            match value {
                Value::Int(_) | Value::UInt(_) | Value::Float(_) => 0,
                Value::Text(_) => 1,
                Value::List(_) => 2,
                Value::Bool(_) => 3,
                Value::Map(_) => 4,
            }
        }

        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.key_cmp(y) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => rank(self).cmp(&rank(other)),
            },
        }
    }
}

// ============================================================================
// Input conversion
// ============================================================================

/// Conversion of caller input into a [`Value`].
///
/// Fallible so that dynamically shaped input (JSON) can be rejected with a
/// [`TypeError`] at issuance time instead of reaching the host.
pub trait IntoValue {
    fn into_value(self) -> Result<Value, TypeError>;
}

impl IntoValue for Value {
    fn into_value(self) -> Result<Value, TypeError> {
        Ok(self)
    }
}

impl IntoValue for &Value {
    fn into_value(self) -> Result<Value, TypeError> {
        Ok(self.clone())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Result<Value, TypeError> {
        Ok(Value::Text(self))
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Result<Value, TypeError> {
        Ok(Value::Text(self.clone()))
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Result<Value, TypeError> {
        Ok(Value::Text(self.to_string()))
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Result<Value, TypeError> {
        Ok(Value::Bool(self))
    }
}

macro_rules! impl_into_value {
    ($variant:ident as $target:ty: $($source:ty),*) => {
        $(
            impl IntoValue for $source {
                fn into_value(self) -> Result<Value, TypeError> {
                    Ok(Value::$variant(self as $target))
                }
            }
        )*
    };
}

impl_into_value!(Int as i64: i8, i16, i32, i64, isize);
impl_into_value!(UInt as u64: u8, u16, u32, u64, usize);
impl_into_value!(Float as f64: f32, f64);

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Result<Value, TypeError> {
        self.into_iter()
            .map(IntoValue::into_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Result<Value, TypeError> {
        self.into_iter()
            .map(|(field, value)| value.into_value().map(|v| (field, v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map)
    }
}

impl IntoValue for serde_json::Value {
    fn into_value(self) -> Result<Value, TypeError> {
        match self {
            serde_json::Value::Null => Err(TypeError::new("null")),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(Value::UInt(u))
                } else {
                    n.as_f64().map(Value::Float).ok_or_else(|| TypeError::new("number"))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Array(items) => items.into_value(),
            serde_json::Value::Object(fields) => fields
                .into_iter()
                .map(|(field, value)| value.into_value().map(|v| (field, v)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Map),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Text(s) => serde_json::Value::String(s),
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::UInt(n) => serde_json::Value::from(n),
            Value::Float(n) => serde_json::Value::from(n),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(fields) => serde_json::Value::Object(
                fields.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}
