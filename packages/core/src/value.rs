//! The Value type - the typed side of the bridge.
//!
//! The peer runtime is dynamically typed, the host is not. `Value` is the
//! meeting point: every argument is converted into one before encoding, and
//! every response is decoded into one before it is converted to the caller's
//! target type.

use std::collections::{BTreeMap, HashMap};

use crate::ndarray::NdArray;

/// A typed value that can cross the process boundary.
///
/// # Design Notes
///
/// - `Tuple` and `List` share the `list` wire tag. A decoded value is always a
///   `List`; the arity of a tuple is fixed by the target type at conversion.
/// - `Dict` uses `BTreeMap` so encoding is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// No value. Acknowledgment of commands without a result.
    #[default]
    Void,
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary buffer with shape and dtype.
    NdArray(NdArray),
    /// Ordered sequence of values.
    List(Vec<Value>),
    /// Fixed-arity sequence of values.
    Tuple(Vec<Value>),
    /// String-keyed mapping.
    Dict(BTreeMap<String, Value>),
}

impl Value {
    /// The wire class tag this value encodes to.
    pub fn class(&self) -> &'static str {
        match self {
            Value::Void => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::NdArray(_) => "ndarray",
            Value::List(_) | Value::Tuple(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Items of a list or tuple.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

// Conversion from common types

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Value::NdArray(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Void)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(v: BTreeMap<String, T>) -> Self {
        Value::Dict(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(v: HashMap<String, T>) -> Self {
        Value::Dict(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

macro_rules! tuple_into_value {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> From<($($name,)+)> for Value {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Value::Tuple(vec![$($name.into()),+])
            }
        }
    };
}

tuple_into_value!(A);
tuple_into_value!(A, B);
tuple_into_value!(A, B, C);
tuple_into_value!(A, B, C, D);
tuple_into_value!(A, B, C, D, E);
tuple_into_value!(A, B, C, D, E, F);
tuple_into_value!(A, B, C, D, E, F, G);
tuple_into_value!(A, B, C, D, E, F, G, H);
