//! Conversions from decoded values into native target types.
//!
//! Each target checks the tag it receives before converting. The only
//! implicit conversions are int into float and narrowing to a smaller
//! integer or float type; everything else is a type mismatch.

use std::collections::{BTreeMap, HashMap};

use crate::ndarray::NdArray;
use crate::{Error, Result, Value};

/// A native type that can be built from a decoded [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Convert a value into a native type.
pub fn from_value<T: FromValue>(value: Value) -> Result<T> {
    T::from_value(value)
}

fn mismatch<T>(expected: &'static str, found: &Value) -> Result<T> {
    Err(Error::type_mismatch(expected, found.class()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

/// Discards whatever the peer returned.
impl FromValue for () {
    fn from_value(_value: Value) -> Result<Self> {
        Ok(())
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            other => mismatch("int", &other),
        }
    }
}

macro_rules! narrow_int {
    ($ty:ty) => {
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                let wide = i64::from_value(value)?;
                <$ty>::try_from(wide).map_err(|_| {
                    Error::type_mismatch(stringify!($ty), format!("int {} out of range", wide))
                })
            }
        }
    };
}

narrow_int!(i32);
narrow_int!(u32);
narrow_int!(u64);
narrow_int!(usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => mismatch("float", &other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
}

impl FromValue for NdArray {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::NdArray(array) => Ok(array),
            other => mismatch("ndarray", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Void => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) | Value::Tuple(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            other => mismatch("list", &other),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Dict(map) => map
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => mismatch("dict", &other),
        }
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Dict(map) => map
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => mismatch("dict", &other),
        }
    }
}

macro_rules! tuple_from_value {
    ($arity:expr; $($name:ident),+) => {
        impl<$($name: FromValue),+> FromValue for ($($name,)+) {
            fn from_value(value: Value) -> Result<Self> {
                let items = match value {
                    Value::List(items) | Value::Tuple(items) => items,
                    other => return mismatch("list", &other),
                };
                if items.len() != $arity {
                    return Err(Error::size_mismatch("tuple arity", $arity, items.len()));
                }
                let mut items = items.into_iter();
                Ok(($(
                    match items.next() {
                        Some(item) => $name::from_value(item)?,
                        None => return Err(Error::size_mismatch("tuple arity", $arity, 0)),
                    },
                )+))
            }
        }
    };
}

tuple_from_value!(1; A);
tuple_from_value!(2; A, B);
tuple_from_value!(3; A, B, C);
tuple_from_value!(4; A, B, C, D);
tuple_from_value!(5; A, B, C, D, E);
tuple_from_value!(6; A, B, C, D, E, F);
tuple_from_value!(7; A, B, C, D, E, F, G);
tuple_from_value!(8; A, B, C, D, E, F, G, H);

/// An argument list for a remote call.
///
/// Implemented for tuples, `()` and `Vec<Value>`; a single argument is
/// written as a one-element tuple: `(vec![1, 2, 3],)`.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Value>;
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Value> {
        Vec::new()
    }
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Vec<Value> {
        self
    }
}

macro_rules! tuple_into_args {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

tuple_into_args!(A);
tuple_into_args!(A, B);
tuple_into_args!(A, B, C);
tuple_into_args!(A, B, C, D);
tuple_into_args!(A, B, C, D, E);
tuple_into_args!(A, B, C, D, E, F);
tuple_into_args!(A, B, C, D, E, F, G);
tuple_into_args!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndarray::DType;
    use crate::wire::{decode_line, encode_line};

    fn through_wire<T: FromValue>(value: impl Into<Value>) -> Result<T> {
        from_value(decode_line(&encode_line(&value.into())?)?)
    }

    #[test]
    fn native_roundtrips() {
        assert_eq!(through_wire::<i64>(-17i64).unwrap(), -17);
        assert_eq!(through_wire::<f64>(2.5f64).unwrap(), 2.5);
        assert_eq!(
            through_wire::<String>("multi\nline").unwrap(),
            "multi\nline"
        );
        assert_eq!(
            through_wire::<Vec<i64>>(vec![1i64, 2, 3]).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(
            through_wire::<(i64, String, f64)>((1i64, "x", 0.25f64)).unwrap(),
            (1, "x".to_string(), 0.25)
        );

        let array = NdArray::from_elements(&[0.5f32, 1.5, 2.5, 3.5], vec![2, 2]).unwrap();
        assert_eq!(through_wire::<NdArray>(array.clone()).unwrap(), array);
    }

    #[test]
    fn int_widens_into_float() {
        assert_eq!(from_value::<f64>(Value::Int(3)).unwrap(), 3.0);
        assert_eq!(from_value::<f32>(Value::Int(-2)).unwrap(), -2.0);
    }

    #[test]
    fn float_does_not_truncate_into_int() {
        assert!(matches!(
            from_value::<i64>(Value::Float(3.9)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn string_into_array_is_type_mismatch() {
        assert!(matches!(
            from_value::<NdArray>(Value::from("nope")),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            from_value::<Vec<i64>>(Value::from("nope")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn narrowing_checks_range() {
        assert_eq!(from_value::<i32>(Value::Int(-5)).unwrap(), -5);
        assert!(matches!(
            from_value::<i32>(Value::Int(i64::MAX)),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            from_value::<usize>(Value::Int(-1)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn tuple_arity_must_match() {
        let three = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(matches!(
            from_value::<(i64, i64)>(three),
            Err(Error::SizeMismatch {
                expected: 2,
                found: 3,
                ..
            })
        ));

        let two = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(from_value::<(i64, i64)>(two).unwrap(), (1, 2));
    }

    #[test]
    fn dict_requires_dict_tag() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), Value::Int(1));
        let decoded: HashMap<String, i64> = from_value(Value::Dict(map)).unwrap();
        assert_eq!(decoded.get("x"), Some(&1));

        assert!(matches!(
            from_value::<BTreeMap<String, i64>>(Value::List(vec![])),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn option_maps_void_to_none() {
        assert_eq!(from_value::<Option<i64>>(Value::Void).unwrap(), None);
        assert_eq!(from_value::<Option<i64>>(Value::Int(2)).unwrap(), Some(2));
    }

    #[test]
    fn unit_discards_anything() {
        from_value::<()>(Value::Void).unwrap();
        from_value::<()>(Value::from(NdArray::empty(DType::Uint8))).unwrap();
    }

    #[test]
    fn into_args_flattens_tuples() {
        let args = (vec![1i64, 2], "s", 1.0f64).into_args();
        assert_eq!(args.len(), 3);
        assert_eq!(args[1], Value::from("s"));
        assert!(().into_args().is_empty());
    }
}
