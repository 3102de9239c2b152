//! UPnP data types and typed argument values.
//!
//! State variables declare their type with a UPnP type name (`ui4`,
//! `string`, `boolean`, ...). Argument values are coerced into a tagged
//! [`Value`] against that declaration before an action is dispatched and
//! again when a response is decoded.

use std::fmt;

use thiserror::Error;

/// A value failed to coerce to its declared data type.
#[derive(Debug, Error)]
#[error("value {value:?} is not a valid {data_type:?}")]
pub struct ValueError {
    /// The raw value that failed coercion
    pub value: String,
    /// The declared data type
    pub data_type: DataType,
}

/// Declared data type of a state variable.
///
/// The UPnP type zoo collapses into five storage classes; the original
/// type name only matters for range width, which the device enforces.
/// Unrecognized type names are treated as strings, matching what the
/// reference stacks do when a description declares an exotic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// ui1 / ui2 / ui4
    Unsigned,
    /// i1 / i2 / i4 / int
    Signed,
    /// r4 / r8 / number / float / fixed.14.4
    Float,
    /// boolean
    Boolean,
    /// string, char, uri, uuid, dates, bin.*
    String,
}

impl DataType {
    /// Map a UPnP type name from an SCPD to a data type.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ui1" | "ui2" | "ui4" => DataType::Unsigned,
            "i1" | "i2" | "i4" | "int" => DataType::Signed,
            "r4" | "r8" | "number" | "float" | "fixed.14.4" => DataType::Float,
            "boolean" => DataType::Boolean,
            _ => DataType::String,
        }
    }

    /// Coerce a raw wire value to this data type.
    pub fn coerce(&self, raw: &str) -> Result<Value, ValueError> {
        let mismatch = || ValueError {
            value: raw.to_string(),
            data_type: *self,
        };

        match self {
            DataType::Unsigned => raw.trim().parse::<u64>().map(Value::UInt).map_err(|_| mismatch()),
            DataType::Signed => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| mismatch()),
            DataType::Float => raw.trim().parse::<f64>().map(Value::Float).map_err(|_| mismatch()),
            DataType::Boolean => match raw.trim() {
                "1" | "true" | "yes" => Ok(Value::Bool(true)),
                "0" | "false" | "no" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            DataType::String => Ok(Value::String(raw.to_string())),
        }
    }
}

/// A typed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String-class value
    String(String),
    /// Unsigned integer value
    UInt(u64),
    /// Signed integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// Floating point value
    Float(f64),
}

impl Value {
    /// The numeric magnitude of the value, when it has one.
    ///
    /// Used for allowed-range checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(_) | Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Value {
    /// Render the value in UPnP wire form (booleans as "1"/"0").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{}", if *v { "1" } else { "0" }),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_name_mapping() {
        assert_eq!(DataType::from_name("ui4"), DataType::Unsigned);
        assert_eq!(DataType::from_name("i2"), DataType::Signed);
        assert_eq!(DataType::from_name("boolean"), DataType::Boolean);
        assert_eq!(DataType::from_name("r8"), DataType::Float);
        assert_eq!(DataType::from_name("string"), DataType::String);
        // Unknown names degrade to string
        assert_eq!(DataType::from_name("bin.base64"), DataType::String);
    }

    #[test]
    fn unsigned_coercion() {
        assert_eq!(DataType::Unsigned.coerce("42").unwrap(), Value::UInt(42));
        assert!(DataType::Unsigned.coerce("-1").is_err());
        assert!(DataType::Unsigned.coerce("Master").is_err());
    }

    #[test]
    fn boolean_coercion_variants() {
        assert_eq!(DataType::Boolean.coerce("1").unwrap(), Value::Bool(true));
        assert_eq!(DataType::Boolean.coerce("true").unwrap(), Value::Bool(true));
        assert_eq!(DataType::Boolean.coerce("no").unwrap(), Value::Bool(false));
        assert!(DataType::Boolean.coerce("maybe").is_err());
    }

    #[test]
    fn wire_rendering() {
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Bool(false).to_string(), "0");
        assert_eq!(Value::UInt(7).to_string(), "7");
        assert_eq!(Value::String("Master".into()).to_string(), "Master");
    }

    #[test]
    fn numeric_magnitude() {
        assert_eq!(Value::UInt(3).as_f64(), Some(3.0));
        assert_eq!(Value::Int(-2).as_f64(), Some(-2.0));
        assert_eq!(Value::String("x".into()).as_f64(), None);
    }
}
