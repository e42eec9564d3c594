//! TCP listener and connector.

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::Result;

/// Bind a listener on `addr`.
pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Connect to `addr`, optionally disabling Nagle's algorithm.
pub async fn dial<A: ToSocketAddrs>(addr: A, nodelay: bool) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    if nodelay {
        stream.set_nodelay(true)?;
    }
    tracing::debug!(peer = %stream.peer_addr()?, "connected");
    Ok(stream)
}
