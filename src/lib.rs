//! # rpch
//!
//! A small RPC transport over any byte stream.
//!
//! Clients open a connection with a 4-byte magic handshake and then send
//! requests as a text line, `"<service> <method> <argCount> <seq>\r\n"`,
//! followed by binary argument frames. Servers answer with binary response
//! frames keyed by the same sequence number. Many calls can be in flight on
//! one connection and responses may come back in any order.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): wire format, compacting buffer, incremental decoders
//! - **Handlers** ([`handler`]): services, methods, dispatch
//! - **Server** / **Client**: one task per connection, one writer task per stream
//!
//! A handler can fail in two ways. A recoverable error
//! ([`HandlerError::Recoverable`]) is written back to the caller as
//! [`RpchError::Remote`] and the connection stays open. Anything else is
//! fatal: the server closes the connection without answering.
//!
//! ## Example
//!
//! ```
//! use rpch::{Client, Server, Service, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rpch::Result<()> {
//! let server = Server::builder()
//!     .service(Service::new("math").method("Add", |args: Vec<Value>| async move {
//!         let a: i32 = args[0].to_scalar()?;
//!         let b: i32 = args[1].to_scalar()?;
//!         Ok(Value::scalar(a + b))
//!     }))
//!     .build();
//!
//! let (client_side, server_side) = tokio::io::duplex(64 * 1024);
//! tokio::spawn(async move { server.serve_connection(server_side).await });
//!
//! let client = Client::connect(client_side).await?;
//! let sum = client
//!     .call("math", "Add", &[Value::scalar(1i32), Value::scalar(2i32)])
//!     .await?;
//! assert_eq!(sum.to_scalar::<i32>()?, 3);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod mux;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod server;

pub use client::{Client, ClientBuilder, PendingCall};
pub use error::{Result, RpchError};
pub use handler::{Handler, HandlerError, HandlerResult, Outcome, Service};
pub use protocol::{Argument, Request, Value};
pub use server::{Server, ServerBuilder, ServerConfig};
