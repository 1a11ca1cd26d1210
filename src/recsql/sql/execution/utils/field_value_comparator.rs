/// Field Value Comparison Utilities
///
/// Handles ordering and equality between FieldValue instances. These are pure
/// comparison functions with no engine state dependency; the ordering
/// comparators and the IN / relational operators are built on them.
use crate::recsql::sql::error::SqlError;
use crate::recsql::sql::execution::types::FieldValue;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;

/// Utility class for comparing FieldValue instances
pub struct FieldValueComparator;

impl FieldValueComparator {
    /// Compare two values for ordering.
    ///
    /// NULL sorts lowest. Integer, Float and Decimal cross-coerce; strings,
    /// booleans, dates and timestamps compare natively. Incomparable type
    /// pairs are a type error.
    pub fn compare_values(left: &FieldValue, right: &FieldValue) -> Result<Ordering, SqlError> {
        use FieldValue::*;

        match (left, right) {
            // NULL is smallest
            (Null, Null) => Ok(Ordering::Equal),
            (Null, _) => Ok(Ordering::Less),
            (_, Null) => Ok(Ordering::Greater),

            (Integer(a), Integer(b)) => Ok(a.cmp(b)),
            (Float(a), Float(b)) => Ok(Self::compare_f64(*a, *b)),
            (String(a), String(b)) => Ok(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Ok(a.cmp(b)),
            (Date(a), Date(b)) => Ok(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Ok(a.cmp(b)),
            (Decimal(a), Decimal(b)) => Ok(a.cmp(b)),

            // Numeric type coercion
            (Integer(a), Float(b)) => Ok(Self::compare_f64(*a as f64, *b)),
            (Float(a), Integer(b)) => Ok(Self::compare_f64(*a, *b as f64)),
            (Decimal(a), Integer(b)) => Ok(a.cmp(&rust_decimal::Decimal::from(*b))),
            (Integer(a), Decimal(b)) => Ok(rust_decimal::Decimal::from(*a).cmp(b)),
            (Decimal(a), Float(b)) => match rust_decimal::Decimal::from_f64(*b) {
                Some(d) => Ok(a.cmp(&d)),
                None => Ok(Self::compare_f64(a.to_f64().unwrap_or(f64::NAN), *b)),
            },
            (Float(a), Decimal(b)) => match rust_decimal::Decimal::from_f64(*a) {
                Some(d) => Ok(d.cmp(b)),
                None => Ok(Self::compare_f64(*a, b.to_f64().unwrap_or(f64::NAN))),
            },

            // Incomparable types
            _ => Err(SqlError::TypeError {
                expected: left.type_name().to_string(),
                actual: right.type_name().to_string(),
                value: Some(right.to_string()),
            }),
        }
    }

    /// Compare two values for equality with numeric coercion.
    ///
    /// Unlike relational comparison, an incomparable type pair is simply not
    /// equal rather than an error; `1 = 'a'` is false, not a failure.
    pub fn values_equal(left: &FieldValue, right: &FieldValue) -> bool {
        match Self::compare_values(left, right) {
            Ok(Ordering::Equal) => true,
            Ok(_) => false,
            Err(_) => left == right,
        }
    }

    fn compare_f64(a: f64, b: f64) -> Ordering {
        if a < b {
            Ordering::Less
        } else if a > b {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}
