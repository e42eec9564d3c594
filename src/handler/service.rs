//! Services, handlers and handler outcomes.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RpchError;
use crate::protocol::{Argument, Value};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// Why a handler did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Business error reported to the caller; the connection stays open.
    Recoverable(String),
    /// Anything else. The connection is torn down without a response.
    Fault(String),
}

impl HandlerError {
    /// Report `message` to the caller as a recoverable error.
    pub fn recoverable(message: impl Into<String>) -> Self {
        HandlerError::Recoverable(message.into())
    }

    /// Abort the connection.
    pub fn fault(reason: impl Into<String>) -> Self {
        HandlerError::Fault(reason.into())
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Recoverable(msg) => write!(f, "recoverable: {}", msg),
            HandlerError::Fault(reason) => write!(f, "fault: {}", reason),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Errors bubbled with `?` inside a handler are faults.
impl From<RpchError> for HandlerError {
    fn from(err: RpchError) -> Self {
        HandlerError::Fault(err.to_string())
    }
}

/// What the dispatcher does with a finished handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Write the value back under the request's seq.
    Success(Value),
    /// Write a type-kind 3 response carrying the message.
    Recoverable(String),
    /// Write nothing and close the connection.
    Fault(String),
}

impl From<HandlerResult> for Outcome {
    fn from(result: HandlerResult) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(HandlerError::Recoverable(msg)) => Outcome::Recoverable(msg),
            Err(HandlerError::Fault(reason)) => Outcome::Fault(reason),
        }
    }
}

/// A remote method: decoded arguments in, value or error out.
///
/// Generated stubs implement this directly; plain closures go through
/// [`Service::method`].
pub trait Handler: Send + Sync + 'static {
    /// Handle one call.
    fn call(&self, args: Vec<Argument>) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter from an async closure to [`Handler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(Vec<Argument>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Vec<Argument>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Wrap a closure.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Vec<Argument>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Argument>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(args))
    }
}

/// A named set of methods.
///
/// # Example
///
/// ```
/// use rpch::{HandlerError, Service, Value};
///
/// let math = Service::new("math").method("Add", |args: Vec<Value>| async move {
///     if args.len() != 2 {
///         return Err(HandlerError::recoverable("invalid argument count"));
///     }
///     let a: i32 = args[0].to_scalar()?;
///     let b: i32 = args[1].to_scalar()?;
///     Ok(Value::scalar(a + b))
/// });
/// assert!(math.has_method("Add"));
/// ```
#[derive(Clone)]
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<dyn Handler>>,
}

impl Service {
    /// Create an empty service.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register an async closure as a method.
    pub fn method<F, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Vec<Argument>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler(name, FnHandler::new(handler))
    }

    /// Register a [`Handler`] implementation as a method.
    ///
    /// A method registered twice keeps the last handler.
    pub fn handler<H: Handler>(mut self, name: &str, handler: H) -> Self {
        self.methods.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// Service name used for lookup.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a method exists.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Get a method's handler.
    pub fn get_handler(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.methods.get(name).cloned()
    }

    /// Method names, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
