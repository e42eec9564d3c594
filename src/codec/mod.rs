//! Codec module - typed helpers for argument and result payloads.
//!
//! The transport treats names and payloads as opaque bytes. Stub code on
//! either side uses these helpers to agree on what they mean:
//!
//! - [`Scalar`] - fixed-width primitives and strings, tagged `int32`, `string`, ...
//! - [`MsgPackCodec`] - structured values using `rmp-serde`, tagged with the type name
//!
//! # Example
//!
//! ```
//! use rpch::Value;
//!
//! let arg = Value::scalar(42u64);
//! assert_eq!(arg.to_scalar::<u64>().unwrap(), 42);
//! ```

mod msgpack;
mod scalar;

pub use msgpack::MsgPackCodec;
pub use scalar::Scalar;
