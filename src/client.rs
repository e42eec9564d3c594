//! Client connection and call API.
//!
//! A [`Client`] owns one connection. Calling a method:
//! 1. Allocates the next sequence number and registers a pending call
//! 2. Encodes the request and queues it on the writer task
//! 3. Waits until the read task decodes the response with the same seq
//!
//! Any number of calls may be in flight; responses may arrive in any order.
//!
//! # Example
//!
//! ```no_run
//! use rpch::{Client, Value};
//!
//! #[tokio::main]
//! async fn main() -> rpch::Result<()> {
//!     let client = Client::dial("127.0.0.1:7000").await?;
//!
//!     let sum = client
//!         .call("math", "Add", &[Value::scalar(1i32), Value::scalar(2i32)])
//!         .await?;
//!     assert_eq!(sum.to_scalar::<i32>()?, 3);
//!
//!     client.destroy();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::ToSocketAddrs;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Result, RpchError};
use crate::mux::Multiplexer;
use crate::protocol::{encode_request, Argument, ResponseDecoder, Value, MAGIC_BYTES};
use crate::transport;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default size of the client read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Callback receiving the error that broke the connection.
type ErrorHook = Arc<dyn Fn(&RpchError) + Send + Sync>;

/// Builder for configuring and creating a [`Client`].
#[derive(Clone)]
pub struct ClientBuilder {
    read_buffer_size: usize,
    writer_config: WriterConfig,
    nodelay: bool,
    on_error: Option<ErrorHook>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer_config: WriterConfig::default(),
            nodelay: true,
            on_error: None,
        }
    }

    /// Set the read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Enable or disable `TCP_NODELAY` when dialing.
    ///
    /// Default: enabled
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Register a callback for transport errors.
    ///
    /// Called once from the read task with the error that ended the
    /// connection, before pending calls fail with
    /// [`RpchError::ConnectionClosed`]. A clean close by the server is not an
    /// error and does not invoke it.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RpchError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Dial a TCP server and start the client on the new socket.
    pub async fn dial<A: ToSocketAddrs>(self, addr: A) -> Result<Client> {
        let stream = transport::dial(addr, self.nodelay).await?;
        self.connect(stream).await
    }

    /// Start the client on an already connected stream.
    ///
    /// Sends the magic handshake before anything else.
    pub async fn connect<S>(self, stream: S) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, self.writer_config);

        writer.send(Bytes::copy_from_slice(&MAGIC_BYTES)).await?;

        let mux = Arc::new(Multiplexer::new());
        let reader_task = tokio::spawn(read_loop(
            reader,
            mux.clone(),
            self.read_buffer_size,
            self.on_error,
        ));

        Ok(Client {
            mux,
            writer,
            reader_task,
            writer_task,
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("read_buffer_size", &self.read_buffer_size)
            .field("writer_config", &self.writer_config)
            .field("nodelay", &self.nodelay)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A call that has been written and is waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    seq: u64,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingCall {
    /// Sequence number carried by the request.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait for the response.
    ///
    /// Resolves to [`RpchError::Remote`] when the server reported a
    /// recoverable error, and to [`RpchError::ConnectionClosed`] when the
    /// connection ended first.
    pub async fn wait(self) -> Result<Value> {
        self.rx.await.map_err(|_| RpchError::ConnectionClosed)?
    }
}

/// A connected RPC client.
pub struct Client {
    mux: Arc<Multiplexer>,
    writer: WriterHandle,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Dial a TCP server with default settings.
    pub async fn dial<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        ClientBuilder::new().dial(addr).await
    }

    /// Start a client with default settings on a connected stream.
    pub async fn connect<S>(stream: S) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        ClientBuilder::new().connect(stream).await
    }

    /// Call `service.method` and wait for the result.
    pub async fn call(&self, service: &str, method: &str, args: &[Argument]) -> Result<Value> {
        self.send(service, method, args).await?.wait().await
    }

    /// Write a request and return without waiting for the response.
    ///
    /// The call is registered before its bytes are queued, so a fast
    /// response cannot arrive ahead of its pending entry. A request that
    /// fails to encode does not consume a sequence number.
    pub async fn send(&self, service: &str, method: &str, args: &[Argument]) -> Result<PendingCall> {
        let (seq, frame, rx) = self
            .mux
            .register_with(|seq| encode_request(seq, service, method, args))?;

        if let Err(e) = self.writer.send(frame).await {
            self.mux.unregister(seq);
            return Err(e);
        }

        tracing::trace!(seq, service, method, "request queued");
        Ok(PendingCall { seq, rx })
    }

    /// Number of calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.mux.pending_count()
    }

    /// Close the connection. Pending calls fail with
    /// [`RpchError::ConnectionClosed`].
    pub fn destroy(self) {
        self.mux.fail_all();
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.mux.fail_all();
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pending_calls", &self.pending_calls())
            .field("closed", &self.mux.is_closed())
            .finish()
    }
}

/// Decode responses until the connection ends, then fail what is left.
async fn read_loop<R>(
    mut reader: R,
    mux: Arc<Multiplexer>,
    buffer_size: usize,
    on_error: Option<ErrorHook>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = ResponseDecoder::new();
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("connection closed by server");
                break;
            }
            Ok(n) => {
                for frame in decoder.push(&buf[..n]) {
                    mux.complete(frame);
                }
            }
            Err(e) => {
                let err = RpchError::from(e);
                tracing::warn!(error = %err, "read failed, destroying connection");
                if let Some(hook) = &on_error {
                    hook(&err);
                }
                break;
            }
        }
    }

    mux.fail_all();
}
