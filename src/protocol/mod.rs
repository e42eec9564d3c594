//! Protocol module - wire format, buffering, framing, and decoding.
//!
//! This module implements the byte-level protocol:
//! - magic handshake, request line, argument and response headers
//! - compacting buffer for accumulating partial reads
//! - incremental request/response decoders
//! - frame types and encoders

mod buffer;
mod decoder;
mod frame;
mod wire_format;

pub use buffer::{CompactingBuffer, DEFAULT_CAPACITY};
pub use decoder::{RequestDecoder, ResponseDecoder};
pub use frame::{
    encode_error_response, encode_request, encode_response, Argument, Request, ResponseFrame,
    Value,
};
pub use wire_format::{
    find_line_end, type_kind, ArgHeader, RequestLine, ResponseHeader, ARG_HEADER_SIZE,
    LINE_TERMINATOR, MAGIC, MAGIC_BYTES, MAGIC_SIZE, MAX_REQUEST_LINE, RESPONSE_HEADER_SIZE,
};
