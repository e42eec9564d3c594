//! Incremental connection decoders.
//!
//! Each connection owns exactly one decoder. Data arrives in chunks from the
//! socket and partial input is kept for the next call. The result does not
//! depend on where the stream was split, including where a fatal error
//! follows valid requests: every request before the bad input is still
//! returned, then the error.
//!
//! Server side ([`RequestDecoder`]):
//! - magic (once): need 4 bytes equal to [`MAGIC`]
//! - `ReadRequestLine`: need a `\r\n`-terminated line
//! - `ReadArguments`: need an 8-byte header, then `name_len + data_len` bytes,
//!   repeated `arg_count` times
//!
//! Client side ([`ResponseDecoder`]):
//! - `WaitingForHeader`: need 16 bytes
//! - `WaitingForBody`: need `name_len + data_len` bytes
//!
//! # Example
//!
//! ```
//! use rpch::protocol::{encode_request, RequestDecoder, Value, MAGIC_BYTES};
//!
//! let mut stream = MAGIC_BYTES.to_vec();
//! stream.extend_from_slice(&encode_request(0, "math", "Add", &[Value::scalar(1i32)]).unwrap());
//!
//! let mut decoder = RequestDecoder::new();
//! let mut requests = Vec::new();
//! for byte in &stream {
//!     decoder.feed(&[*byte]);
//!     while let Some(request) = decoder.next_request().unwrap() {
//!         requests.push(request);
//!     }
//! }
//! assert_eq!(requests.len(), 1);
//! assert_eq!(requests[0].method, "Add");
//! ```

use bytes::Bytes;

use super::buffer::CompactingBuffer;
use super::frame::{Argument, Request, ResponseFrame};
use super::wire_format::{
    find_line_end, ArgHeader, RequestLine, ResponseHeader, ARG_HEADER_SIZE, LINE_TERMINATOR,
    MAGIC, MAGIC_SIZE, MAX_REQUEST_LINE, RESPONSE_HEADER_SIZE,
};
use crate::error::{Result, RpchError};

/// Server-side parse state.
#[derive(Debug)]
enum RequestState {
    /// Waiting for a complete request line.
    ReadRequestLine,
    /// Line parsed, collecting arguments. `header` is set while the body of
    /// the current argument is still incomplete.
    ReadArguments {
        request: Request,
        header: Option<ArgHeader>,
    },
}

/// Turns the server's inbound byte stream into [`Request`]s.
#[derive(Debug)]
pub struct RequestDecoder {
    buffer: CompactingBuffer,
    magic_verified: bool,
    state: RequestState,
}

impl RequestDecoder {
    /// Create a decoder for a fresh connection.
    pub fn new() -> Self {
        Self {
            buffer: CompactingBuffer::new(),
            magic_verified: false,
            state: RequestState::ReadRequestLine,
        }
    }

    /// Append a chunk read from the connection.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.append(chunk);
    }

    /// Decode the next complete request from the buffered input.
    ///
    /// Returns `Ok(None)` when more data is needed. Requests are yielded one
    /// at a time so that everything ahead of bad input is seen before the
    /// error.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the connection: wrong magic, a request line
    /// that is too long or malformed. The decoder must not be used afterwards.
    pub fn next_request(&mut self) -> Result<Option<Request>> {
        if !self.magic_verified {
            if self.buffer.len() < MAGIC_SIZE {
                return Ok(None);
            }
            let view = self.buffer.view(..MAGIC_SIZE);
            let magic = u32::from_le_bytes([view[0], view[1], view[2], view[3]]);
            if magic != MAGIC {
                return Err(RpchError::Protocol(format!(
                    "invalid magic number {:#010x}",
                    magic
                )));
            }
            self.buffer.consume(MAGIC_SIZE);
            self.magic_verified = true;
        }

        self.try_extract_one()
    }

    /// Try to finish one request.
    ///
    /// Returns `Ok(None)` when more data is needed.
    fn try_extract_one(&mut self) -> Result<Option<Request>> {
        if matches!(self.state, RequestState::ReadRequestLine) {
            match take_request_line(&mut self.buffer)? {
                Some(line) => {
                    self.state = RequestState::ReadArguments {
                        request: Request::from_line(line),
                        header: None,
                    };
                }
                None => return Ok(None),
            }
        }

        if let RequestState::ReadArguments { request, header } = &mut self.state {
            while !request.is_complete() {
                match take_argument(&mut self.buffer, header) {
                    Some(arg) => request.args.push(arg),
                    None => return Ok(None),
                }
            }
        }

        match std::mem::replace(&mut self.state, RequestState::ReadRequestLine) {
            RequestState::ReadArguments { request, .. } => Ok(Some(request)),
            RequestState::ReadRequestLine => Ok(None),
        }
    }

    /// Whether the handshake has been seen.
    #[inline]
    pub fn magic_verified(&self) -> bool {
        self.magic_verified
    }

    /// Number of buffered bytes not yet decoded.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            RequestState::ReadRequestLine => "ReadRequestLine",
            RequestState::ReadArguments { .. } => "ReadArguments",
        }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-side parse state.
#[derive(Debug, Clone, Copy)]
enum ResponseState {
    WaitingForHeader,
    WaitingForBody(ResponseHeader),
}

/// Turns the client's inbound byte stream into [`ResponseFrame`]s.
#[derive(Debug)]
pub struct ResponseDecoder {
    buffer: CompactingBuffer,
    state: ResponseState,
}

impl ResponseDecoder {
    /// Create a decoder for a fresh connection.
    pub fn new() -> Self {
        Self {
            buffer: CompactingBuffer::new(),
            state: ResponseState::WaitingForHeader,
        }
    }

    /// Push data into the decoder and extract all complete responses.
    ///
    /// Responses are framed by declared lengths only, so there is no
    /// failure mode: incomplete input simply stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ResponseFrame> {
        self.buffer.append(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    fn try_extract_one(&mut self) -> Option<ResponseFrame> {
        let header = match self.state {
            ResponseState::WaitingForBody(header) => header,
            ResponseState::WaitingForHeader => {
                let header = ResponseHeader::decode(self.buffer.view(..))?;
                self.buffer.consume(RESPONSE_HEADER_SIZE);
                self.state = ResponseState::WaitingForBody(header);
                header
            }
        };

        let (name, data) = take_body(
            &mut self.buffer,
            header.name_len as usize,
            header.data_len as usize,
        )?;
        self.state = ResponseState::WaitingForHeader;

        Some(ResponseFrame {
            seq: header.seq,
            type_kind: header.type_kind,
            name,
            data,
        })
    }

    /// Number of buffered bytes not yet decoded.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume one request line from the front of the buffer.
///
/// A line may take at most [`MAX_REQUEST_LINE`] bytes including its
/// terminator, whether or not the terminator has arrived yet.
fn take_request_line(buffer: &mut CompactingBuffer) -> Result<Option<RequestLine>> {
    let live = buffer.view(..);
    let index = match find_line_end(live) {
        Some(index) => index,
        None if live.len() >= MAX_REQUEST_LINE => {
            return Err(RpchError::Protocol("request line is too large".to_string()));
        }
        None => return Ok(None),
    };

    let consumed = index + LINE_TERMINATOR.len();
    if consumed > MAX_REQUEST_LINE {
        return Err(RpchError::Protocol("request line is too large".to_string()));
    }

    let line = RequestLine::parse(&live[..index])?;
    buffer.consume(consumed);
    Ok(Some(line))
}

/// Consume one argument, remembering its header across calls.
fn take_argument(buffer: &mut CompactingBuffer, pending: &mut Option<ArgHeader>) -> Option<Argument> {
    let header = match *pending {
        Some(header) => header,
        None => {
            let header = ArgHeader::decode(buffer.view(..))?;
            buffer.consume(ARG_HEADER_SIZE);
            *pending = Some(header);
            header
        }
    };

    let (name, data) = take_body(buffer, header.name_len as usize, header.data_len as usize)?;
    *pending = None;

    Some(Argument {
        type_kind: header.type_kind,
        name,
        data,
    })
}

/// Consume `name_len + data_len` bytes once all of them are buffered.
fn take_body(
    buffer: &mut CompactingBuffer,
    name_len: usize,
    data_len: usize,
) -> Option<(Bytes, Bytes)> {
    let total = name_len + data_len;
    if buffer.len() < total {
        return None;
    }

    let body = buffer.view(..total);
    let name = Bytes::copy_from_slice(&body[..name_len]);
    let data = Bytes::copy_from_slice(&body[name_len..]);
    buffer.consume(total);
    Some((name, data))
}
