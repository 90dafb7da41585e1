//! Full-duplex relay between a client and a backend connection.
//!
//! Each direction copies through its own patcher and half-closes its destination once the
//! source reaches end-of-stream, so both peers observe proper stream termination. The relay
//! completes when both directions have finished.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use jongleur_core::patch::Patcher;

const BUFFER_SIZE: usize = 16 * 1024;

/// Bytes written in each direction, after patching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes written to the backend.
    pub sent: u64,
    /// Bytes written to the client.
    pub received: u64,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("client->backend"),
            Self::Response => f.write_str("backend->client"),
        }
    }
}

/// Relay `client` and `backend` until both directions reach end-of-stream.
///
/// I/O errors end the affected direction like end-of-stream does; they are not reported.
pub async fn relay<C, B>(
    client: C,
    backend: B,
    request_patcher: Box<dyn Patcher>,
    response_patcher: Box<dyn Patcher>,
) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Send,
    B: AsyncRead + AsyncWrite + Send,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);

    let (sent, received) = tokio::join!(
        copy_patched(
            &mut client_read,
            &mut backend_write,
            request_patcher,
            Direction::Request
        ),
        copy_patched(
            &mut backend_read,
            &mut client_write,
            response_patcher,
            Direction::Response
        ),
    );

    RelayStats { sent, received }
}

async fn copy_patched<R, W>(
    reader: &mut R,
    writer: &mut W,
    mut patcher: Box<dyn Patcher>,
    direction: Direction,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut patched = Vec::with_capacity(BUFFER_SIZE);
    let mut written = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                debug!(%direction, error = %err, "Read failed, ending direction");
                break;
            }
        };

        patched.clear();
        patcher.patch(&buf[..n], &mut patched);

        if let Err(err) = writer.write_all(&patched).await {
            debug!(%direction, error = %err, "Write failed, ending direction");
            break;
        }
        written += patched.len() as u64;
    }

    // Half-close: the peer sees end-of-stream while the other direction keeps flowing.
    if let Err(err) = writer.shutdown().await {
        debug!(%direction, error = %err, "Half-close failed");
    }

    written
}
