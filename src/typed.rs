//! deepstream's typed payload encoding.
//!
//! Event data carries a one-byte type prefix: `S` string, `N` number,
//! `T` true, `F` false, `L` null, `U` undefined, `O` JSON object or array.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DeepstreamError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    String,
    Number,
    True,
    False,
    Null,
    Undefined,
    Object,
}

impl PayloadType {
    pub fn prefix(self) -> u8 {
        match self {
            PayloadType::String => b'S',
            PayloadType::Number => b'N',
            PayloadType::True => b'T',
            PayloadType::False => b'F',
            PayloadType::Null => b'L',
            PayloadType::Undefined => b'U',
            PayloadType::Object => b'O',
        }
    }

    pub fn from_prefix(prefix: u8) -> Option<Self> {
        match prefix {
            b'S' => Some(PayloadType::String),
            b'N' => Some(PayloadType::Number),
            b'T' => Some(PayloadType::True),
            b'F' => Some(PayloadType::False),
            b'L' => Some(PayloadType::Null),
            b'U' => Some(PayloadType::Undefined),
            b'O' => Some(PayloadType::Object),
            _ => None,
        }
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => PayloadType::Object,
            Value::String(_) => PayloadType::String,
            Value::Number(_) => PayloadType::Number,
            Value::Bool(true) => PayloadType::True,
            Value::Bool(false) => PayloadType::False,
            Value::Null => PayloadType::Null,
        }
    }
}

/// Encode any serializable value with its type prefix.
pub fn encode<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(data)?;
    encode_value(&value)
}

pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let kind = PayloadType::of(value);
    let mut buffer = vec![kind.prefix()];
    match value {
        Value::String(s) => buffer.extend_from_slice(s.as_bytes()),
        Value::Number(_) | Value::Object(_) | Value::Array(_) => {
            buffer.extend_from_slice(&serde_json::to_vec(value)?)
        }
        Value::Bool(_) | Value::Null => {}
    }
    Ok(buffer)
}

/// Decode a prefixed payload into a JSON value. `U` decodes to null.
pub fn decode_value(buffer: &[u8]) -> Result<Value> {
    let (&prefix, rest) = buffer
        .split_first()
        .ok_or_else(|| DeepstreamError::InvalidPayload("empty payload".to_string()))?;

    let kind = PayloadType::from_prefix(prefix).ok_or_else(|| {
        DeepstreamError::InvalidPayload(format!("unknown type prefix {:?}", prefix as char))
    })?;

    match kind {
        PayloadType::String => {
            let s = std::str::from_utf8(rest)
                .map_err(|e| DeepstreamError::InvalidPayload(e.to_string()))?;
            Ok(Value::String(s.to_string()))
        }
        PayloadType::Number | PayloadType::Object => Ok(serde_json::from_slice(rest)?),
        PayloadType::True => Ok(Value::Bool(true)),
        PayloadType::False => Ok(Value::Bool(false)),
        PayloadType::Null | PayloadType::Undefined => Ok(Value::Null),
    }
}

/// Decode a prefixed payload into any deserializable type.
pub fn decode<T: DeserializeOwned>(buffer: &[u8]) -> Result<T> {
    Ok(serde_json::from_value(decode_value(buffer)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn encodes_each_type() {
        assert_eq!(encode("bar").unwrap(), b"Sbar");
        assert_eq!(encode(&42).unwrap(), b"N42");
        assert_eq!(encode(&true).unwrap(), b"T");
        assert_eq!(encode(&false).unwrap(), b"F");
        assert_eq!(encode(&Value::Null).unwrap(), b"L");
        assert_eq!(encode(&json!([1, 2])).unwrap(), b"O[1,2]");
    }

    #[test]
    fn decodes_each_type() {
        assert_eq!(decode_value(b"Sbar").unwrap(), json!("bar"));
        assert_eq!(decode_value(b"N1.5").unwrap(), json!(1.5));
        assert_eq!(decode_value(b"T").unwrap(), json!(true));
        assert_eq!(decode_value(b"F").unwrap(), json!(false));
        assert_eq!(decode_value(b"L").unwrap(), Value::Null);
        assert_eq!(decode_value(b"U").unwrap(), Value::Null);
        assert_eq!(decode_value(b"O{\"a\":1}").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn decodes_into_structs() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Position {
            x: i32,
            y: i32,
        }

        let pos: Position = decode(b"O{\"x\":3,\"y\":-1}").unwrap();
        assert_eq!(pos, Position { x: 3, y: -1 });
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(matches!(
            decode_value(b""),
            Err(DeepstreamError::InvalidPayload(_))
        ));
        assert!(matches!(
            decode_value(b"Zzz"),
            Err(DeepstreamError::InvalidPayload(_))
        ));
        assert!(matches!(
            decode_value(b"O{not json"),
            Err(DeepstreamError::JsonError(_))
        ));
    }
}
