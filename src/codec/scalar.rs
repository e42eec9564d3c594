//! Scalar codec - fixed-width little-endian primitives and UTF-8 strings.
//!
//! Each scalar type has a tag that travels in the value's `name`:
//!
//! | Rust     | Tag       | Payload            |
//! |----------|-----------|--------------------|
//! | `i32`    | `int32`   | 4 bytes LE         |
//! | `u32`    | `uint32`  | 4 bytes LE         |
//! | `i64`    | `int64`   | 8 bytes LE         |
//! | `u64`    | `uint64`  | 8 bytes LE         |
//! | `f64`    | `float64` | 8 bytes LE         |
//! | `bool`   | `bool`    | 1 byte, 0 or 1     |
//! | `String` | `string`  | UTF-8, any length  |
//!
//! # Example
//!
//! ```
//! use rpch::Value;
//!
//! let value = Value::scalar(3i32);
//! assert_eq!(&value.name[..], b"int32");
//! assert_eq!(&value.data[..], &[3, 0, 0, 0]);
//! assert_eq!(value.to_scalar::<i32>().unwrap(), 3);
//! ```

use bytes::Bytes;

use crate::error::{Result, RpchError};
use crate::protocol::Value;

/// A primitive with a fixed type tag and byte representation.
pub trait Scalar: Sized {
    /// Tag written into the value name.
    const TAG: &'static str;

    /// Payload bytes for this value.
    fn to_bytes(&self) -> Bytes;

    /// Parse a payload; `None` if the length or content is wrong.
    fn from_bytes(data: &[u8]) -> Option<Self>;
}

macro_rules! impl_le_scalar {
    ($ty:ty, $tag:literal) => {
        impl Scalar for $ty {
            const TAG: &'static str = $tag;

            #[inline]
            fn to_bytes(&self) -> Bytes {
                Bytes::copy_from_slice(&self.to_le_bytes())
            }

            #[inline]
            fn from_bytes(data: &[u8]) -> Option<Self> {
                Some(<$ty>::from_le_bytes(data.try_into().ok()?))
            }
        }
    };
}

impl_le_scalar!(i32, "int32");
impl_le_scalar!(u32, "uint32");
impl_le_scalar!(i64, "int64");
impl_le_scalar!(u64, "uint64");
impl_le_scalar!(f64, "float64");

impl Scalar for bool {
    const TAG: &'static str = "bool";

    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&[u8::from(*self)])
    }

    fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }
}

impl Scalar for String {
    const TAG: &'static str = "string";

    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    fn from_bytes(data: &[u8]) -> Option<Self> {
        String::from_utf8(data.to_vec()).ok()
    }
}

impl Value {
    /// Build an ordinary value from a scalar.
    pub fn scalar<T: Scalar>(value: T) -> Self {
        Value::with_name(T::TAG, value.to_bytes())
    }

    /// Read the value as a scalar, checking its tag and payload length.
    pub fn to_scalar<T: Scalar>(&self) -> Result<T> {
        if &self.name[..] == T::TAG.as_bytes() {
            if let Some(value) = T::from_bytes(&self.data) {
                return Ok(value);
            }
        }
        Err(RpchError::TypeMismatch {
            expected: T::TAG,
            found: format!(
                "{} ({} bytes)",
                String::from_utf8_lossy(&self.name),
                self.data.len()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_layout() {
        let value = Value::scalar(-1i32);
        assert_eq!(&value.name[..], b"int32");
        assert_eq!(&value.data[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_round_trip_each_scalar() {
        assert_eq!(Value::scalar(-5i32).to_scalar::<i32>().unwrap(), -5);
        assert_eq!(Value::scalar(7u32).to_scalar::<u32>().unwrap(), 7);
        assert_eq!(Value::scalar(i64::MIN).to_scalar::<i64>().unwrap(), i64::MIN);
        assert_eq!(Value::scalar(13u64).to_scalar::<u64>().unwrap(), 13);
        assert_eq!(Value::scalar(0.5f64).to_scalar::<f64>().unwrap(), 0.5);
        assert!(Value::scalar(true).to_scalar::<bool>().unwrap());
        assert_eq!(
            Value::scalar("héllo".to_string()).to_scalar::<String>().unwrap(),
            "héllo"
        );
    }

    #[test]
    fn test_wrong_tag_is_rejected() {
        let err = Value::scalar(1u32).to_scalar::<i32>().unwrap_err();
        assert!(matches!(err, RpchError::TypeMismatch { expected: "int32", .. }));
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let value = Value::with_name("int32", vec![1u8, 0, 0]);
        assert!(value.to_scalar::<i32>().is_err());
    }

    #[test]
    fn test_bool_rejects_other_bytes() {
        let value = Value::with_name("bool", vec![2u8]);
        assert!(value.to_scalar::<bool>().is_err());
    }
}
