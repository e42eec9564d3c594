//! Transport module - stream helpers.
//!
//! Servers and clients run over any `AsyncRead + AsyncWrite` stream. These
//! helpers cover the common TCP case.

mod tcp;

pub use tcp::{bind, dial};
