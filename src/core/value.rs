use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::{DbError, Result};

/// A scalar field value, independent of how the store encodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) => {
                if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Store encoding of the value. `None` means there is nothing to write.
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Boolean(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        }
    }

    /// Score used in a sorted-set index. Booleans map to 1/0.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                (*i as f64 - f).abs() < f64::EPSILON
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// Declared type of a field, fixed when the schema is built.
///
/// Each variant owns the conversion from the raw store string back into a
/// [`Value`], so replies never go through runtime type guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    /// JSON document stored as its serialized text.
    Json,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Json, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn decode(&self, raw: &str) -> Result<Value> {
        match self {
            Self::Integer => raw.parse::<i64>().map(Value::Integer).map_err(|_| {
                DbError::TypeMismatch(format!("cannot decode '{}' as {}", raw, self))
            }),
            Self::Float => raw.parse::<f64>().map(Value::Float).map_err(|_| {
                DbError::TypeMismatch(format!("cannot decode '{}' as {}", raw, self))
            }),
            Self::Boolean => match raw {
                "1" | "true" => Ok(Value::Boolean(true)),
                "0" | "false" => Ok(Value::Boolean(false)),
                _ => Err(DbError::TypeMismatch(format!(
                    "cannot decode '{}' as {}",
                    raw, self
                ))),
            },
            Self::Text | Self::Json => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Json => write!(f, "JSON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Float(3.14), Value::Float(3.14));
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Integer(1), Value::Integer(2));
    }

    #[test]
    fn test_encode() {
        assert_eq!(Value::Null.encode(), None);
        assert_eq!(Value::Boolean(true).encode().as_deref(), Some("1"));
        assert_eq!(Value::Integer(-7).encode().as_deref(), Some("-7"));
        assert_eq!(Value::Float(0.1).encode().as_deref(), Some("0.1"));
    }

    #[test]
    fn test_decode_by_type() {
        assert_eq!(DataType::Integer.decode("12").unwrap(), Value::Integer(12));
        assert_eq!(DataType::Float.decode("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(DataType::Boolean.decode("0").unwrap(), Value::Boolean(false));
        assert_eq!(
            DataType::Text.decode("hello").unwrap(),
            Value::Text("hello".into())
        );
    }

    #[test]
    fn test_decode_mismatch() {
        assert!(matches!(
            DataType::Integer.decode("abc"),
            Err(DbError::TypeMismatch(_))
        ));
        assert!(DataType::Boolean.decode("yes").is_err());
    }

    #[test]
    fn test_score() {
        assert_eq!(Value::Boolean(true).score(), Some(1.0));
        assert_eq!(Value::Integer(3).score(), Some(3.0));
        assert_eq!(Value::Text("a".into()).score(), None);
    }

    #[test]
    fn test_type_compatibility() {
        let int_type = DataType::Integer;
        assert!(int_type.is_compatible(&Value::Integer(42)));
        assert!(int_type.is_compatible(&Value::Null));
        assert!(!int_type.is_compatible(&Value::Text("hello".into())));
        assert!(DataType::Float.is_compatible(&Value::Integer(1)));
    }
}
