//! Handler module - services and request dispatch.
//!
//! Provides:
//! - [`Handler`] - one remote method: arguments in, value or error out
//! - [`Service`] - a named set of methods
//! - [`ServiceRegistry`] - maps service names to services and dispatches requests
//!
//! A handler finishes in one of three ways, captured by [`Outcome`]:
//! a value, a recoverable error ([`HandlerError::Recoverable`]) that is sent
//! back as a type-kind 3 response, or a fault that closes the connection.
//!
//! # Example
//!
//! ```
//! use rpch::{HandlerError, Service, Value};
//!
//! let strings = Service::new("string").method("Upper", |args: Vec<Value>| async move {
//!     let s: String = args
//!         .first()
//!         .ok_or_else(|| HandlerError::recoverable("missing argument"))?
//!         .to_scalar()?;
//!     Ok(Value::scalar(s.to_uppercase()))
//! });
//! assert_eq!(strings.name(), "string");
//! ```

mod registry;
mod service;

pub use registry::ServiceRegistry;
pub use service::{BoxFuture, FnHandler, Handler, HandlerError, HandlerResult, Outcome, Service};
