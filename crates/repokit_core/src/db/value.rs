//! Conversions from Rust values into bound SQL arguments.

use super::Value;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Timestamp text layout, identical to rusqlite's `ToSql` for `DateTime`, so
/// bound arguments compare equal to values written through entity fields.
const TIMESTAMP_FORMAT: &str = "%F %T%.f%:z";

/// Converts a Rust value into an owned SQL argument.
///
/// Implemented for the scalar types used in filters and bulk updates.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Value {
        Value::Text(self.clone())
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Blob(self)
    }
}

impl IntoValue for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::Text(self.format(TIMESTAMP_FORMAT).to_string())
    }
}

impl IntoValue for Uuid {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(value) => value.into_value(),
            None => Value::Null,
        }
    }
}

macro_rules! integer_into_value {
    ($($ty:ty),*) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::Integer(i64::from(self))
                }
            }
        )*
    };
}

integer_into_value!(i8, i16, i32, i64, u8, u16, u32);
