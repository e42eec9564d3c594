//! Service registry and request dispatch.
//!
//! The registry maps service names to [`Service`]s. Registering a service
//! under a name that already exists replaces it.
//!
//! # Example
//!
//! ```
//! use rpch::handler::ServiceRegistry;
//! use rpch::{Service, Value};
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register(Service::new("math").method("Add", |args: Vec<Value>| async move {
//!     let a: i32 = args[0].to_scalar()?;
//!     let b: i32 = args[1].to_scalar()?;
//!     Ok(Value::scalar(a + b))
//! }));
//! assert!(registry.get("math").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use super::service::{BoxFuture, Outcome, Service};
use crate::error::{Result, RpchError};
use crate::protocol::{encode_error_response, encode_response, Request};

/// Registry mapping service names to services.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service, replacing any service with the same name.
    pub fn register(&mut self, service: Service) {
        let name = service.name().to_string();
        if self.services.insert(name.clone(), Arc::new(service)).is_some() {
            tracing::debug!(service = %name, "replaced registered service");
        }
    }

    /// Get a service by name.
    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name).map(|s| s.as_ref())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Route a request to its handler.
    ///
    /// Lookup happens immediately; the returned future runs the handler and
    /// resolves to the encoded response frame.
    ///
    /// # Errors
    ///
    /// Returns [`RpchError::ServiceNotFound`] or [`RpchError::MethodNotFound`]
    /// on lookup miss. The future fails with [`RpchError::HandlerFault`] when
    /// the handler faults. All three are fatal for the connection.
    pub fn dispatch(&self, request: Request) -> Result<BoxFuture<'static, Result<Bytes>>> {
        let service = self
            .services
            .get(&request.service)
            .ok_or_else(|| RpchError::ServiceNotFound(request.service.clone()))?;

        let handler = service
            .get_handler(&request.method)
            .ok_or_else(|| RpchError::MethodNotFound {
                service: request.service.clone(),
                method: request.method.clone(),
            })?;

        let Request {
            service,
            method,
            seq,
            args,
            ..
        } = request;
        let call = handler.call(args);

        Ok(Box::pin(async move {
            match Outcome::from(call.await) {
                Outcome::Success(value) => {
                    encode_response(seq, value.type_kind, &value.name, &value.data)
                }
                Outcome::Recoverable(message) => {
                    tracing::debug!(%service, %method, seq, %message, "handler returned recoverable error");
                    encode_error_response(seq, &message)
                }
                Outcome::Fault(reason) => {
                    tracing::error!(%service, %method, seq, %reason, "handler fault");
                    Err(RpchError::HandlerFault(reason))
                }
            }
        }))
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.services.iter()).finish()
    }
}
