//! Outbound connections to backend endpoints.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use jongleur_core::Endpoint;

/// Opens a connection to an endpoint.
///
/// Connect timeouts are applied by the caller, so implementations may block for as long as
/// the underlying connect does.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// The connection type; both halves must support independent shutdown.
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `endpoint`.
    async fn dial(&self, endpoint: &Endpoint) -> io::Result<Self::Conn>;
}

/// Dials endpoints as TCP `host:port` addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(endpoint.as_str()).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
