//! Server builder and per-connection loop.
//!
//! A [`Server`] holds the service registry and configuration. Each accepted
//! connection runs in its own task:
//! 1. Split the stream; the write half goes to a dedicated writer task
//! 2. Read chunks and feed them to a [`RequestDecoder`]
//! 3. Dispatch every decoded request into a per-connection `JoinSet`
//! 4. On bad input, stop reading, let already dispatched requests answer,
//!    then close; on a handler fault, abort in-flight handlers and drop the
//!    connection without writing a response
//!
//! # Example
//!
//! ```no_run
//! use rpch::{HandlerError, Server, Service, Value};
//!
//! #[tokio::main]
//! async fn main() -> rpch::Result<()> {
//!     let server = Server::builder()
//!         .service(Service::new("math").method("Add", |args: Vec<Value>| async move {
//!             if args.len() != 2 {
//!                 return Err(HandlerError::recoverable("invalid argument count"));
//!             }
//!             let a: i32 = args[0].to_scalar()?;
//!             let b: i32 = args[1].to_scalar()?;
//!             Ok(Value::scalar(a + b))
//!         }))
//!         .build();
//!
//!     server.listen("127.0.0.1:7000").await
//! }
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::error::{Result, RpchError};
use crate::handler::{Service, ServiceRegistry};
use crate::protocol::RequestDecoder;
use crate::transport;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default size of the per-connection read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Per-connection settings shared by every connection of a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bytes requested per read.
    pub read_buffer_size: usize,
    /// Writer task configuration.
    pub writer: WriterConfig,
    /// Set `TCP_NODELAY` on accepted sockets.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer: WriterConfig::default(),
            nodelay: true,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    registry: ServiceRegistry,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. A later service with the same name replaces it.
    pub fn service(mut self, service: Service) -> Self {
        self.registry.register(service);
        self
    }

    /// Set the read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Enable or disable `TCP_NODELAY` on accepted sockets.
    ///
    /// Default: enabled
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    pub fn build(self) -> Server {
        Server {
            registry: Arc::new(self.registry),
            config: self.config,
        }
    }
}

/// An RPC server. Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct Server {
    registry: Arc<ServiceRegistry>,
    config: ServerConfig,
}

impl Server {
    /// Create a server with no services and default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Register a service, replacing any service with the same name.
    ///
    /// Connections already running keep the registry they started with.
    pub fn register(&mut self, service: Service) {
        Arc::make_mut(&mut self.registry).register(service);
    }

    /// The registered services.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Bind `addr` and serve connections until accepting fails.
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let listener = transport::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Each connection runs in its own task. Returns only when `accept` fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            if self.config.nodelay {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::warn!(%peer, error = %e, "failed to set TCP_NODELAY");
                }
            }
            tracing::debug!(%peer, "connection accepted");

            let server = self.clone();
            tokio::spawn(async move {
                // Fatal errors are logged by serve_connection.
                let _ = server.serve_connection(stream).await;
                tracing::debug!(%peer, "connection closed");
            });
        }
    }

    /// Run the request loop on one connection until it closes.
    ///
    /// Returns `Ok(())` when the peer closes its side and every in-flight
    /// handler has answered. Returns the fatal error otherwise.
    ///
    /// When the fatal error comes from the inbound stream (bad magic, a bad
    /// request line, an unknown service or method, a read failure), requests
    /// dispatched before it still get their responses, then the stream is
    /// closed. When a handler faults, the other handlers are aborted and
    /// nothing more is written.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, self.config.writer.clone());
        let mut decoder = RequestDecoder::new();
        let mut handlers: JoinSet<Result<()>> = JoinSet::new();
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        let mut failure: Option<RpchError> = None;

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => {
                            decoder.feed(&buf[..n]);
                            if let Err(e) = self.dispatch_ready(&mut decoder, &writer, &mut handlers) {
                                failure = Some(e);
                                break;
                            }
                        }
                        Err(e) => {
                            failure = Some(RpchError::from(e));
                            break;
                        }
                    }
                }
                Some(joined) = handlers.join_next() => {
                    if let Err(e) = handler_finished(joined) {
                        return destroy(handlers, writer_task, e).await;
                    }
                }
            }
        }

        // Answer what is already in flight.
        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = handler_finished(joined) {
                return destroy(handlers, writer_task, e).await;
            }
        }

        drop(writer);
        if let Ok(Err(e)) = writer_task.await {
            tracing::debug!(error = %e, "writer failed during close");
        }
        match failure {
            Some(e) => {
                tracing::warn!(error = %e, "closing connection after fatal input");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Dispatch every request the decoder can complete, in stream order.
    ///
    /// Stops at the first decode or lookup error; the requests before it are
    /// already running.
    fn dispatch_ready(
        &self,
        decoder: &mut RequestDecoder,
        writer: &WriterHandle,
        handlers: &mut JoinSet<Result<()>>,
    ) -> Result<()> {
        while let Some(request) = decoder.next_request()? {
            let response = self.registry.dispatch(request)?;
            let writer = writer.clone();
            handlers.spawn(async move {
                let frame = response.await?;
                writer.send(frame).await
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Abort everything still running on the connection without writing more.
async fn destroy(
    mut handlers: JoinSet<Result<()>>,
    writer_task: JoinHandle<Result<()>>,
    error: RpchError,
) -> Result<()> {
    tracing::warn!(error = %error, "destroying connection");
    handlers.shutdown().await;
    writer_task.abort();
    let _ = writer_task.await;
    Err(error)
}

/// A panicking handler is a fault like any other.
fn handler_finished(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            tracing::error!("handler panicked");
            Err(RpchError::HandlerFault("handler panicked".to_string()))
        }
        Err(_) => Ok(()),
    }
}
