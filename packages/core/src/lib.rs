//! procbridge core: typed values and the wire codec
//!
//! This layer is shared by every other procbridge crate:
//! - `Value`: the typed side of the bridge
//! - `NdArray` / `DType`: binary buffers with shape and dtype metadata
//! - `wire`: the tagged JSON line format spoken with the peer
//! - `FromValue` / `IntoArgs`: conversions between `Value` and native types
//! - `Error`: the error taxonomy for every layer
//!
//! # Example
//!
//! ```rust
//! use procbridge_core::{from_value, wire, Value};
//!
//! let line = wire::encode_line(&Value::from((1i64, "two"))).unwrap();
//! let (one, two): (i64, String) = from_value(wire::decode_line(&line).unwrap()).unwrap();
//! assert_eq!((one, two.as_str()), (1, "two"));
//! ```

mod convert;
mod error;
mod ndarray;
mod value;
pub mod wire;

pub use convert::{from_value, FromValue, IntoArgs};
pub use error::{Error, Result};
pub use ndarray::{element_count, DType, Element, NdArray};
pub use value::Value;
