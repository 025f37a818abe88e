//! The tagged wire representation.
//!
//! Every value is a JSON object with a `class` discriminator:
//!
//! ```text
//! {"class": "int",     "value": 42}
//! {"class": "float",   "value": 1.5}
//! {"class": "string",  "value": "hi"}
//! {"class": "ndarray", "data": "<base64>", "dtype": "uint8", "shape": [2, 3]}
//! {"class": "list",    "value": [<value>, ...]}
//! {"class": "dict",    "value": {"key": <value>, ...}}
//! {"class": "null"}
//! ```
//!
//! Lines are produced by `serde_json`, which escapes every control
//! character, so an encoded line never contains a raw `\n`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Number};

use crate::ndarray::{DType, NdArray};
use crate::{Error, Result, Value};

pub const CLASS_INT: &str = "int";
pub const CLASS_FLOAT: &str = "float";
pub const CLASS_STRING: &str = "string";
pub const CLASS_NDARRAY: &str = "ndarray";
pub const CLASS_LIST: &str = "list";
pub const CLASS_DICT: &str = "dict";
pub const CLASS_NULL: &str = "null";

/// Convert a value to its tagged JSON form.
///
/// # Errors
///
/// Non-finite floats have no JSON representation and fail with a protocol
/// error.
pub fn to_wire(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Void => json!({ "class": CLASS_NULL }),
        Value::Int(i) => json!({ "class": CLASS_INT, "value": i }),
        Value::Float(f) => {
            let number = Number::from_f64(*f)
                .ok_or_else(|| Error::protocol(format!("cannot encode non-finite float {}", f)))?;
            json!({ "class": CLASS_FLOAT, "value": number })
        }
        Value::String(s) => json!({ "class": CLASS_STRING, "value": s }),
        Value::NdArray(array) => json!({
            "class": CLASS_NDARRAY,
            "data": STANDARD.encode(array.as_bytes()),
            "dtype": array.dtype(),
            "shape": array.shape(),
        }),
        Value::List(items) | Value::Tuple(items) => {
            let encoded = items.iter().map(to_wire).collect::<Result<Vec<_>>>()?;
            json!({ "class": CLASS_LIST, "value": encoded })
        }
        Value::Dict(map) => {
            let mut encoded = Map::new();
            for (key, item) in map {
                encoded.insert(key.clone(), to_wire(item)?);
            }
            json!({ "class": CLASS_DICT, "value": encoded })
        }
    })
}

/// Parse a tagged JSON value.
///
/// # Errors
///
/// Returns a protocol error for a missing or unknown `class`, a malformed
/// payload, or an ndarray whose byte length disagrees with its shape.
pub fn from_wire(wire: serde_json::Value) -> Result<Value> {
    let mut object = match wire {
        serde_json::Value::Object(object) => object,
        other => {
            return Err(Error::protocol(format!(
                "expected a tagged object, got {}",
                other
            )))
        }
    };

    let class = match object.remove("class") {
        Some(serde_json::Value::String(class)) => class,
        Some(other) => return Err(Error::protocol(format!("class must be a string, got {}", other))),
        None => return Err(Error::protocol("missing class tag")),
    };

    match class.as_str() {
        CLASS_NULL => Ok(Value::Void),
        CLASS_INT => {
            let payload = take_field(&mut object, &class, "value")?;
            payload
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| Error::protocol(format!("int payload out of range: {}", payload)))
        }
        CLASS_FLOAT => {
            let payload = take_field(&mut object, &class, "value")?;
            payload
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| Error::protocol(format!("float payload is not a number: {}", payload)))
        }
        CLASS_STRING => match take_field(&mut object, &class, "value")? {
            serde_json::Value::String(s) => Ok(Value::String(s)),
            other => Err(Error::protocol(format!("string payload is not a string: {}", other))),
        },
        CLASS_NDARRAY => decode_ndarray(&mut object).map(Value::NdArray),
        CLASS_LIST => match take_field(&mut object, &class, "value")? {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(from_wire)
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            other => Err(Error::protocol(format!("list payload is not an array: {}", other))),
        },
        CLASS_DICT => match take_field(&mut object, &class, "value")? {
            serde_json::Value::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, item) in entries {
                    map.insert(key, from_wire(item)?);
                }
                Ok(Value::Dict(map))
            }
            other => Err(Error::protocol(format!("dict payload is not an object: {}", other))),
        },
        unknown => Err(Error::protocol(format!("unknown class tag: {}", unknown))),
    }
}

fn take_field(
    object: &mut Map<String, serde_json::Value>,
    class: &str,
    field: &str,
) -> Result<serde_json::Value> {
    object
        .remove(field)
        .ok_or_else(|| Error::protocol(format!("{} value is missing '{}'", class, field)))
}

fn decode_ndarray(object: &mut Map<String, serde_json::Value>) -> Result<NdArray> {
    let data = match take_field(object, CLASS_NDARRAY, "data")? {
        serde_json::Value::String(data) => STANDARD
            .decode(data.as_bytes())
            .map_err(|e| Error::protocol(format!("invalid ndarray data: {}", e)))?,
        other => return Err(Error::protocol(format!("ndarray data is not a string: {}", other))),
    };
    let dtype: DType = match take_field(object, CLASS_NDARRAY, "dtype")? {
        serde_json::Value::String(name) => name.parse()?,
        other => return Err(Error::protocol(format!("ndarray dtype is not a string: {}", other))),
    };
    let shape: Vec<usize> = serde_json::from_value(take_field(object, CLASS_NDARRAY, "shape")?)?;
    NdArray::from_bytes(data, shape, dtype)
}

/// Encode a value as one protocol line (without the trailing newline).
pub fn encode_line(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&to_wire(value)?)?)
}

/// Decode one protocol line.
pub fn decode_line(line: &str) -> Result<Value> {
    let wire: serde_json::Value = serde_json::from_str(line)?;
    from_wire(wire)
}
