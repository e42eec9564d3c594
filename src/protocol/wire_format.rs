//! Wire format constants, fixed headers and the request line.
//!
//! Argument header (8 bytes):
//! ```text
//! ┌───────────┬──────────┬──────────┐
//! │ Type kind │ Name len │ Data len │
//! │ uint16 LE │ uint16 LE│ uint32 LE│
//! └───────────┴──────────┴──────────┘
//! ```
//!
//! Response header (16 bytes):
//! ```text
//! ┌───────────┬───────────┬──────────┬──────────┐
//! │ Seq       │ Type kind │ Name len │ Data len │
//! │ uint64 LE │ uint16 LE │ uint16 LE│ uint32 LE│
//! └───────────┴───────────┴──────────┴──────────┘
//! ```
//!
//! Both headers are followed by `name_len` bytes of name and `data_len` bytes
//! of payload. A request is the text line `"<service> <method> <argc> <seq>\r\n"`
//! followed by `argc` argument frames.

use crate::error::{Result, RpchError};

/// Connection handshake, sent once by the client as a little-endian u32.
pub const MAGIC: u32 = 0x0068_6a6c;

/// Handshake size in bytes.
pub const MAGIC_SIZE: usize = 4;

/// Handshake bytes as they appear on the wire.
pub const MAGIC_BYTES: [u8; MAGIC_SIZE] = MAGIC.to_le_bytes();

/// Argument header size in bytes.
pub const ARG_HEADER_SIZE: usize = 8;

/// Response header size in bytes.
pub const RESPONSE_HEADER_SIZE: usize = 16;

/// Longest request line accepted, terminator included.
pub const MAX_REQUEST_LINE: usize = 4096;

/// Request line terminator.
pub const LINE_TERMINATOR: &[u8; 2] = b"\r\n";

/// Type-kind values carried by arguments and responses.
pub mod type_kind {
    /// Ordinary value.
    pub const VALUE: u16 = 0;
    /// Reserved for streamed responses.
    pub const STREAM: u16 = 1;
    /// Reserved for one-way messages.
    pub const MESSAGE: u16 = 2;
    /// Recoverable error; the payload is a UTF-8 message.
    pub const ERROR: u16 = 3;
    /// Reserved for calls without a return value.
    pub const NO_RETURN: u16 = 4;
}

/// Decoded argument header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgHeader {
    pub type_kind: u16,
    pub name_len: u16,
    pub data_len: u32,
}

impl ArgHeader {
    /// Encode header to bytes (Little Endian).
    pub fn encode(&self) -> [u8; ARG_HEADER_SIZE] {
        let mut buf = [0u8; ARG_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.type_kind.to_le_bytes());
        buf[2..4].copy_from_slice(&self.name_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.data_len.to_le_bytes());
        buf
    }

    /// Decode header from bytes. Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ARG_HEADER_SIZE {
            return None;
        }
        Some(Self {
            type_kind: u16::from_le_bytes([buf[0], buf[1]]),
            name_len: u16::from_le_bytes([buf[2], buf[3]]),
            data_len: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Number of name and payload bytes following the header.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.name_len as usize + self.data_len as usize
    }
}

/// Decoded response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub seq: u64,
    pub type_kind: u16,
    pub name_len: u16,
    pub data_len: u32,
}

impl ResponseHeader {
    /// Encode header to bytes (Little Endian).
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut buf = [0u8; RESPONSE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.seq.to_le_bytes());
        buf[8..10].copy_from_slice(&self.type_kind.to_le_bytes());
        buf[10..12].copy_from_slice(&self.name_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.data_len.to_le_bytes());
        buf
    }

    /// Decode header from bytes. Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RESPONSE_HEADER_SIZE {
            return None;
        }
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&buf[0..8]);
        Some(Self {
            seq: u64::from_le_bytes(seq),
            type_kind: u16::from_le_bytes([buf[8], buf[9]]),
            name_len: u16::from_le_bytes([buf[10], buf[11]]),
            data_len: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Number of name and payload bytes following the header.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.name_len as usize + self.data_len as usize
    }
}

/// Parsed `"<service> <method> <argc> <seq>"` line, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub service: String,
    pub method: String,
    pub arg_count: u32,
    pub seq: u64,
}

impl RequestLine {
    /// Parse a request line without its `\r\n`.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = std::str::from_utf8(line)
            .map_err(|_| RpchError::Protocol("request line is not valid UTF-8".to_string()))?;

        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() != 4 {
            return Err(RpchError::Protocol(format!(
                "invalid request line: expected 4 fields, found {}",
                fields.len()
            )));
        }

        let arg_count = fields[2].parse::<u32>().map_err(|_| {
            RpchError::Protocol(format!("invalid argument count: {:?}", fields[2]))
        })?;
        let seq = fields[3]
            .parse::<u64>()
            .map_err(|_| RpchError::Protocol(format!("invalid sequence number: {:?}", fields[3])))?;

        Ok(Self {
            service: fields[0].to_string(),
            method: fields[1].to_string(),
            arg_count,
            seq,
        })
    }

    /// Render the line including its terminator.
    pub fn encode(&self) -> Result<String> {
        validate_token("service", &self.service)?;
        validate_token("method", &self.method)?;
        let line = format!(
            "{} {} {} {}\r\n",
            self.service, self.method, self.arg_count, self.seq
        );
        if line.len() > MAX_REQUEST_LINE {
            return Err(RpchError::Protocol(format!(
                "request line of {} bytes exceeds maximum {}",
                line.len(),
                MAX_REQUEST_LINE
            )));
        }
        Ok(line)
    }
}

/// Service and method names must survive a split on single spaces.
fn validate_token(what: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(RpchError::Protocol(format!("{} name is empty", what)));
    }
    if token.bytes().any(|b| matches!(b, b' ' | b'\r' | b'\n')) {
        return Err(RpchError::Protocol(format!(
            "{} name {:?} contains a separator",
            what, token
        )));
    }
    Ok(())
}

/// Position of the first `\r\n` in `buf`.
#[inline]
pub fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_TERMINATOR.len())
        .position(|w| w == LINE_TERMINATOR)
}
