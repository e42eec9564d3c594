//! Decoded frame types and their encoders.
//!
//! Uses `bytes::Bytes` so decoded names and payloads can be handed to
//! handlers and callers without further copies.
//!
//! # Example
//!
//! ```
//! use rpch::protocol::{encode_request, Value, MAGIC_BYTES};
//!
//! let args = [Value::scalar(1i32), Value::scalar(2i32)];
//! let bytes = encode_request(0, "math", "Add", &args).unwrap();
//! assert!(bytes.starts_with(b"math Add 2 0\r\n"));
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    type_kind, ArgHeader, RequestLine, ResponseHeader, ARG_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::error::{Result, RpchError};

/// A typed byte payload: one argument of a call, or one result.
///
/// `name` is conventionally a type tag (`"int32"`, `"string"`, a struct
/// name). The transport never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub type_kind: u16,
    pub name: Bytes,
    pub data: Bytes,
}

/// One positional input to a remote call.
pub type Argument = Value;

impl Value {
    /// Create a value with an explicit type-kind.
    pub fn new(type_kind: u16, name: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self {
            type_kind,
            name: name.into(),
            data: data.into(),
        }
    }

    /// Create an ordinary value (type-kind 0).
    pub fn with_name(name: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self::new(type_kind::VALUE, name, data)
    }

    /// The name as UTF-8, if it is valid.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    fn header(&self) -> Result<ArgHeader> {
        Ok(ArgHeader {
            type_kind: self.type_kind,
            name_len: name_len(&self.name)?,
            data_len: data_len(&self.data)?,
        })
    }
}

/// A fully decoded request, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub service: String,
    pub method: String,
    pub arg_count: u32,
    pub seq: u64,
    /// Arguments in wire order.
    pub args: Vec<Argument>,
}

impl Request {
    /// Start assembling a request from its parsed line.
    pub(crate) fn from_line(line: RequestLine) -> Self {
        Self {
            service: line.service,
            method: line.method,
            arg_count: line.arg_count,
            seq: line.seq,
            // Declared count is untrusted; cap the preallocation.
            args: Vec::with_capacity((line.arg_count as usize).min(16)),
        }
    }

    /// Whether all declared arguments have been decoded.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.args.len() as u64 >= u64::from(self.arg_count)
    }
}

/// A decoded response, keyed by the sequence number of its call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub seq: u64,
    pub type_kind: u16,
    pub name: Bytes,
    pub data: Bytes,
}

impl ResponseFrame {
    /// Check if this response carries a recoverable error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.type_kind == type_kind::ERROR
    }

    /// Turn the frame into what the caller sees.
    ///
    /// Type-kind 3 becomes [`RpchError::Remote`] with the payload as message;
    /// every other kind, reserved ones included, is returned as a value.
    pub fn into_result(self) -> Result<Value> {
        if self.is_error() {
            return Err(RpchError::Remote(
                String::from_utf8_lossy(&self.data).into_owned(),
            ));
        }
        Ok(Value {
            type_kind: self.type_kind,
            name: self.name,
            data: self.data,
        })
    }
}

/// Encode a complete request: request line followed by every argument frame.
pub fn encode_request(seq: u64, service: &str, method: &str, args: &[Argument]) -> Result<Bytes> {
    let arg_count = u32::try_from(args.len()).map_err(|_| {
        RpchError::Protocol(format!("too many arguments: {}", args.len()))
    })?;
    let line = RequestLine {
        service: service.to_string(),
        method: method.to_string(),
        arg_count,
        seq,
    }
    .encode()?;

    let body: usize = args
        .iter()
        .map(|a| ARG_HEADER_SIZE + a.name.len() + a.data.len())
        .sum();
    let mut buf = BytesMut::with_capacity(line.len() + body);
    buf.put_slice(line.as_bytes());

    for arg in args {
        buf.put_slice(&arg.header()?.encode());
        buf.put_slice(&arg.name);
        buf.put_slice(&arg.data);
    }

    Ok(buf.freeze())
}

/// Encode a response frame for the call identified by `seq`.
pub fn encode_response(seq: u64, type_kind: u16, name: &[u8], data: &[u8]) -> Result<Bytes> {
    let header = ResponseHeader {
        seq,
        type_kind,
        name_len: name_len(name)?,
        data_len: data_len(data)?,
    };

    let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_SIZE + name.len() + data.len());
    buf.put_slice(&header.encode());
    buf.put_slice(name);
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// Encode a type-kind 3 response carrying `message`.
pub fn encode_error_response(seq: u64, message: &str) -> Result<Bytes> {
    encode_response(seq, type_kind::ERROR, b"", message.as_bytes())
}

fn name_len(name: &[u8]) -> Result<u16> {
    u16::try_from(name.len()).map_err(|_| {
        RpchError::Protocol(format!(
            "name of {} bytes exceeds maximum {}",
            name.len(),
            u16::MAX
        ))
    })
}

fn data_len(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len()).map_err(|_| {
        RpchError::Protocol(format!(
            "payload of {} bytes exceeds maximum {}",
            data.len(),
            u32::MAX
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_add_request_layout() {
        let args = [
            Value::with_name("int32", 1i32.to_le_bytes().to_vec()),
            Value::with_name("int32", 2i32.to_le_bytes().to_vec()),
        ];
        let bytes = encode_request(0, "math", "Add", &args).unwrap();

        let mut expected = b"math Add 2 0\r\n".to_vec();
        for n in [1u8, 2u8] {
            expected.extend_from_slice(&[0, 0, 5, 0, 4, 0, 0, 0]);
            expected.extend_from_slice(b"int32");
            expected.extend_from_slice(&[n, 0, 0, 0]);
        }
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_encode_request_without_arguments() {
        let bytes = encode_request(41, "clock", "Now", &[]).unwrap();
        assert_eq!(&bytes[..], b"clock Now 0 41\r\n");
    }

    #[test]
    fn test_encode_request_rejects_bad_names() {
        assert!(encode_request(0, "", "Add", &[]).is_err());
        assert!(encode_request(0, "math", "A d d", &[]).is_err());
    }

    #[test]
    fn test_encode_request_rejects_long_argument_name() {
        let arg = Value::with_name(vec![b'n'; u16::MAX as usize + 1], Bytes::new());
        let err = encode_request(0, "math", "Add", &[arg]).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_encode_response_layout() {
        let bytes = encode_response(7, type_kind::VALUE, b"int32", &[3, 0, 0, 0]).unwrap();
        assert_eq!(bytes.len(), RESPONSE_HEADER_SIZE + 5 + 4);

        let header = ResponseHeader::decode(&bytes).unwrap();
        assert_eq!(header.seq, 7);
        assert_eq!(header.type_kind, type_kind::VALUE);
        assert_eq!(header.name_len, 5);
        assert_eq!(header.data_len, 4);
        assert_eq!(&bytes[RESPONSE_HEADER_SIZE..], b"int32\x03\x00\x00\x00");
    }

    #[test]
    fn test_encode_error_response() {
        let bytes = encode_error_response(3, "bad input").unwrap();
        let header = ResponseHeader::decode(&bytes).unwrap();
        assert_eq!(header.type_kind, type_kind::ERROR);
        assert_eq!(header.name_len, 0);
        assert_eq!(&bytes[RESPONSE_HEADER_SIZE..], b"bad input");
    }

    #[test]
    fn test_response_into_result() {
        let ok = ResponseFrame {
            seq: 0,
            type_kind: type_kind::VALUE,
            name: Bytes::from_static(b"int32"),
            data: Bytes::from_static(&[3, 0, 0, 0]),
        };
        let value = ok.into_result().unwrap();
        assert_eq!(value.name_str(), Some("int32"));
        assert_eq!(&value.data[..], &[3, 0, 0, 0]);

        let err = ResponseFrame {
            seq: 1,
            type_kind: type_kind::ERROR,
            name: Bytes::new(),
            data: Bytes::from_static(b"bad input"),
        };
        match err.into_result() {
            Err(RpchError::Remote(msg)) => assert_eq!(msg, "bad input"),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_kind_passes_through_as_value() {
        let frame = ResponseFrame {
            seq: 0,
            type_kind: type_kind::STREAM,
            name: Bytes::new(),
            data: Bytes::from_static(b"chunk"),
        };
        let value = frame.into_result().unwrap();
        assert_eq!(value.type_kind, type_kind::STREAM);
    }

    #[test]
    fn test_request_completion() {
        let mut request = Request::from_line(RequestLine {
            service: "math".into(),
            method: "Add".into(),
            arg_count: 1,
            seq: 0,
        });
        assert!(!request.is_complete());
        request.args.push(Value::with_name("int32", vec![0u8; 4]));
        assert!(request.is_complete());
    }
}
