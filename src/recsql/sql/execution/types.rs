//! Core data types for query execution.
//!
//! This module contains the fundamental types the engine operates on:
//! - [`FieldValue`] - the value type system covering SQL-style data types
//! - [`Record`] - the named-field record format queries run against
//!
//! Equality on both types is structural; grouping keys and DISTINCT
//! deduplication rely on it. There is deliberately no `Hash` implementation:
//! grouping compares key tuples by linear scan, never by hash bucketing.

use crate::recsql::sql::error::SqlError;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A value in a record field
///
/// This enum represents all supported data types in the execution engine:
/// simple scalars, temporal values, exact decimals, and the nested
/// collection/map/struct shapes produced by serde ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value (true/false)
    Boolean(bool),
    /// SQL NULL value
    Null,
    /// Date (YYYY-MM-DD)
    Date(NaiveDate),
    /// Timestamp (YYYY-MM-DD HH:MM:SS[.nnn])
    Timestamp(NaiveDateTime),
    /// Decimal type for precise arithmetic
    Decimal(Decimal),
    /// Array of values
    Array(Vec<FieldValue>),
    /// Map of string keys to values
    Map(HashMap<String, FieldValue>),
    /// Structured data with named fields
    Struct(HashMap<String, FieldValue>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d),
            FieldValue::Timestamp(t) => write!(f, "{}", t),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            FieldValue::Map(map) | FieldValue::Struct(map) => {
                // Keys sorted so the rendering is deterministic
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, map[*k])?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Custom Serialize implementation for FieldValue
///
/// Serialization format:
/// - Date → YYYY-MM-DD string
/// - Timestamp → ISO format string with milliseconds
/// - Decimal → string representation (precision preserved)
impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            FieldValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            }
            FieldValue::Decimal(dec) => serializer.serialize_str(&dec.to_string()),
            FieldValue::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for elem in arr {
                    seq.serialize_element(elem)?;
                }
                seq.end()
            }
            FieldValue::Map(map) | FieldValue::Struct(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

impl FieldValue {
    /// Get the type name for error messages and debugging
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "INTEGER",
            FieldValue::Float(_) => "FLOAT",
            FieldValue::String(_) => "STRING",
            FieldValue::Boolean(_) => "BOOLEAN",
            FieldValue::Null => "NULL",
            FieldValue::Date(_) => "DATE",
            FieldValue::Timestamp(_) => "TIMESTAMP",
            FieldValue::Decimal(_) => "DECIMAL",
            FieldValue::Array(_) => "ARRAY",
            FieldValue::Map(_) => "MAP",
            FieldValue::Struct(_) => "STRUCT",
        }
    }

    /// Check if this value is a numeric type usable in arithmetic
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldValue::Integer(_) | FieldValue::Float(_) | FieldValue::Decimal(_)
        )
    }

    /// Truth test applied by predicates and boolean expressions.
    ///
    /// NULL is false, booleans are themselves, numeric values are true iff
    /// strictly positive, every other non-null value is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Boolean(b) => *b,
            FieldValue::Integer(i) => *i > 0,
            FieldValue::Float(f) => *f > 0.0,
            FieldValue::Decimal(d) => d.is_sign_positive() && !d.is_zero(),
            _ => true,
        }
    }

    /// Add two values with numeric type coercion.
    ///
    /// Integer + Integer stays Integer; mixing in a Float promotes to Float;
    /// mixing in a Decimal promotes to Decimal. String + String concatenates.
    /// NULL absorbs: any operand being NULL yields NULL.
    pub fn add(&self, other: &FieldValue) -> Result<FieldValue, SqlError> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Ok(FieldValue::Integer(a + b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => Ok(FieldValue::Float(a + b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => Ok(FieldValue::Float(*a as f64 + b)),
            (FieldValue::Float(a), FieldValue::Integer(b)) => Ok(FieldValue::Float(a + *b as f64)),
            (FieldValue::Decimal(a), FieldValue::Decimal(b)) => Ok(FieldValue::Decimal(a + b)),
            (FieldValue::Decimal(a), FieldValue::Integer(b)) => {
                Ok(FieldValue::Decimal(a + Decimal::from(*b)))
            }
            (FieldValue::Integer(a), FieldValue::Decimal(b)) => {
                Ok(FieldValue::Decimal(Decimal::from(*a) + b))
            }
            (FieldValue::Decimal(a), FieldValue::Float(b)) => Self::decimal_float_op(a, *b, |x, y| x + y),
            (FieldValue::Float(a), FieldValue::Decimal(b)) => Self::float_decimal_op(*a, b, |x, y| x + y),
            (FieldValue::String(a), FieldValue::String(b)) => {
                Ok(FieldValue::String(format!("{}{}", a, b)))
            }
            _ => Err(Self::arithmetic_type_error("add", self, other)),
        }
    }

    /// Subtract two values with numeric type coercion.
    pub fn subtract(&self, other: &FieldValue) -> Result<FieldValue, SqlError> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Ok(FieldValue::Integer(a - b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => Ok(FieldValue::Float(a - b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => Ok(FieldValue::Float(*a as f64 - b)),
            (FieldValue::Float(a), FieldValue::Integer(b)) => Ok(FieldValue::Float(a - *b as f64)),
            (FieldValue::Decimal(a), FieldValue::Decimal(b)) => Ok(FieldValue::Decimal(a - b)),
            (FieldValue::Decimal(a), FieldValue::Integer(b)) => {
                Ok(FieldValue::Decimal(a - Decimal::from(*b)))
            }
            (FieldValue::Integer(a), FieldValue::Decimal(b)) => {
                Ok(FieldValue::Decimal(Decimal::from(*a) - b))
            }
            (FieldValue::Decimal(a), FieldValue::Float(b)) => Self::decimal_float_op(a, *b, |x, y| x - y),
            (FieldValue::Float(a), FieldValue::Decimal(b)) => Self::float_decimal_op(*a, b, |x, y| x - y),
            _ => Err(Self::arithmetic_type_error("subtract", self, other)),
        }
    }

    /// Multiply two values with numeric type coercion.
    pub fn multiply(&self, other: &FieldValue) -> Result<FieldValue, SqlError> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Ok(FieldValue::Integer(a * b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => Ok(FieldValue::Float(a * b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => Ok(FieldValue::Float(*a as f64 * b)),
            (FieldValue::Float(a), FieldValue::Integer(b)) => Ok(FieldValue::Float(a * *b as f64)),
            (FieldValue::Decimal(a), FieldValue::Decimal(b)) => Ok(FieldValue::Decimal(a * b)),
            (FieldValue::Decimal(a), FieldValue::Integer(b)) => {
                Ok(FieldValue::Decimal(a * Decimal::from(*b)))
            }
            (FieldValue::Integer(a), FieldValue::Decimal(b)) => {
                Ok(FieldValue::Decimal(Decimal::from(*a) * b))
            }
            (FieldValue::Decimal(a), FieldValue::Float(b)) => Self::decimal_float_op(a, *b, |x, y| x * y),
            (FieldValue::Float(a), FieldValue::Decimal(b)) => Self::float_decimal_op(*a, b, |x, y| x * y),
            _ => Err(Self::arithmetic_type_error("multiply", self, other)),
        }
    }

    /// Divide two values with numeric type coercion. Division by zero is an
    /// execution error, not NULL.
    pub fn divide(&self, other: &FieldValue) -> Result<FieldValue, SqlError> {
        if other.is_numeric() && other.as_f64() == Some(0.0) {
            return Err(SqlError::execution_error("division by zero"));
        }
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Ok(FieldValue::Integer(a / b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => Ok(FieldValue::Float(a / b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => Ok(FieldValue::Float(*a as f64 / b)),
            (FieldValue::Float(a), FieldValue::Integer(b)) => Ok(FieldValue::Float(a / *b as f64)),
            (FieldValue::Decimal(a), FieldValue::Decimal(b)) => Ok(FieldValue::Decimal(a / b)),
            (FieldValue::Decimal(a), FieldValue::Integer(b)) => {
                Ok(FieldValue::Decimal(a / Decimal::from(*b)))
            }
            (FieldValue::Integer(a), FieldValue::Decimal(b)) => {
                Ok(FieldValue::Decimal(Decimal::from(*a) / b))
            }
            (FieldValue::Decimal(a), FieldValue::Float(b)) => Self::decimal_float_op(a, *b, |x, y| x / y),
            (FieldValue::Float(a), FieldValue::Decimal(b)) => Self::float_decimal_op(*a, b, |x, y| x / y),
            _ => Err(Self::arithmetic_type_error("divide", self, other)),
        }
    }

    /// Numeric value as f64, when this is a numeric type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Numeric value as a non-negative index, for LIMIT offsets and counts.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            FieldValue::Integer(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }

    fn decimal_float_op(
        a: &Decimal,
        b: f64,
        op: fn(Decimal, Decimal) -> Decimal,
    ) -> Result<FieldValue, SqlError> {
        match Decimal::from_f64(b) {
            Some(d) => Ok(FieldValue::Decimal(op(*a, d))),
            None => Err(SqlError::type_error(
                "DECIMAL",
                "FLOAT",
                Some(b.to_string()),
            )),
        }
    }

    fn float_decimal_op(
        a: f64,
        b: &Decimal,
        op: fn(Decimal, Decimal) -> Decimal,
    ) -> Result<FieldValue, SqlError> {
        match Decimal::from_f64(a) {
            Some(d) => Ok(FieldValue::Decimal(op(d, *b))),
            None => Err(SqlError::type_error(
                "DECIMAL",
                "FLOAT",
                Some(a.to_string()),
            )),
        }
    }

    fn arithmetic_type_error(op: &str, left: &FieldValue, right: &FieldValue) -> SqlError {
        SqlError::type_error(
            "numeric operands",
            format!("{} {} {}", left.type_name(), op, right.type_name()),
            None,
        )
    }

    /// Convert a `serde_json::Value` into a FieldValue.
    ///
    /// Objects become `Struct` values, arrays become `Array`; numbers map to
    /// Integer when they fit in i64, Float otherwise.
    pub fn from_json(value: serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Struct(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// A record under query: a named-field value map.
///
/// Records are the unit of the FROM collection. Equality is structural, which
/// is what `SELECT DISTINCT *` deduplicates by.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Field name to value mapping
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    /// Create a record from a field map.
    pub fn new(fields: HashMap<String, FieldValue>) -> Self {
        Record { fields }
    }

    /// Build a record from any `Serialize` type, routed through
    /// `serde_json::Value`. The serialized root must be an object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Record, SqlError> {
        let json = serde_json::to_value(value).map_err(|e| {
            SqlError::execution_error(format!("unable to serialize record: {}", e))
        })?;
        match FieldValue::from_json(json) {
            FieldValue::Struct(fields) => Ok(Record { fields }),
            other => Err(SqlError::type_error(
                "STRUCT",
                other.type_name(),
                Some(other.to_string()),
            )),
        }
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The record as a struct value, for `:_currobj` and projection into
    /// normalized rows.
    pub fn as_value(&self) -> FieldValue {
        FieldValue::Struct(self.fields.clone())
    }
}

impl From<HashMap<String, FieldValue>> for Record {
    fn from(fields: HashMap<String, FieldValue>) -> Self {
        Record { fields }
    }
}
