//! MsgPack codec for structured argument and result payloads.
//!
//! Structs are written with `to_vec_named` so they travel as maps keyed by
//! field name. Peers in other languages decode them without knowing the
//! Rust field order.
//!
//! The value's `name` carries the struct's type tag (`"TwoNum"`,
//! `"Quotient"`). Decoding checks the tag before touching the payload.
//!
//! # Example
//!
//! ```
//! use rpch::codec::MsgPackCodec;
//! use rpch::Value;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct TwoNum {
//!     a: i32,
//!     b: i32,
//! }
//!
//! let value = Value::msgpack("TwoNum", &TwoNum { a: -4, b: 5 }).unwrap();
//! let decoded: TwoNum = value.decode_msgpack("TwoNum").unwrap();
//! assert_eq!(decoded, TwoNum { a: -4, b: 5 });
//! ```

use bytes::Bytes;

use crate::error::{Result, RpchError};
use crate::protocol::Value;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Value {
    /// Build an ordinary value holding `payload` as MsgPack, tagged with `tag`.
    pub fn msgpack<T: serde::Serialize>(tag: &'static str, payload: &T) -> Result<Self> {
        let data = MsgPackCodec::encode(payload)?;
        Ok(Value::with_name(tag, Bytes::from(data)))
    }

    /// Decode a MsgPack payload after checking the value carries `tag`.
    pub fn decode_msgpack<T: serde::de::DeserializeOwned>(&self, tag: &'static str) -> Result<T> {
        if &self.name[..] != tag.as_bytes() {
            return Err(RpchError::TypeMismatch {
                expected: tag,
                found: String::from_utf8_lossy(&self.name).into_owned(),
            });
        }
        MsgPackCodec::decode(&self.data)
    }
}
