//! Server module: listener lifecycle and the connection dispatcher.

use std::io;
use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use jongleur_core::MutableRing;

use crate::config::ProxyConfig;
use crate::dialer::{Dialer, TcpDialer};
use crate::error::Result;
use crate::handler::ConnectionHandler;
use crate::listen::{Accepted, Listener};
use crate::membership::{spawn_synchronizer, MembershipLoader};

/// A proxy whose listener is bound but which is not serving yet.
pub struct Proxy {
    config: ProxyConfig,
    listener: Listener,
    loader: Arc<dyn MembershipLoader>,
    ring: Arc<MutableRing>,
}

impl Proxy {
    /// Validate `config` and bind the listener.
    ///
    /// Nothing is spawned yet, so a failure here leaves no background work behind.
    pub async fn bind(config: ProxyConfig, loader: Arc<dyn MembershipLoader>) -> Result<Self> {
        config.validate()?;
        let listener = Listener::bind(&config.listen).await?;
        Ok(Self {
            config,
            listener,
            loader,
            ring: Arc::new(MutableRing::new()),
        })
    }

    /// The bound listen address.
    pub fn local_addr(&self) -> io::Result<String> {
        self.listener.local_addr()
    }

    /// The endpoint ring fed by the synchronizer.
    pub fn ring(&self) -> Arc<MutableRing> {
        Arc::clone(&self.ring)
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// On shutdown the proxy stops accepting, stops the synchronizer, stops the ring and
    /// releases the listener, in that order. Connections already being relayed are left
    /// to finish on their own.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let Proxy {
            config,
            listener,
            loader,
            ring,
        } = self;

        let local_addr = listener.local_addr()?;

        let sync_stop = CancellationToken::new();
        let synchronizer =
            spawn_synchronizer(Arc::clone(&ring), loader, config.period, sync_stop.clone());

        let handler = Arc::new(ConnectionHandler::new(
            ring.selector(),
            TcpDialer,
            config.handler.clone(),
            Arc::clone(&config.request_patcher),
            Arc::clone(&config.response_patcher),
        ));

        info!(listen = %local_addr, "Listening for connections");

        let accept_stop = CancellationToken::new();
        let dispatcher = tokio::spawn(accept_loop(listener, handler, accept_stop.clone()));

        shutdown.cancelled().await;
        info!("Shutting down");

        accept_stop.cancel();
        let listener = joined(dispatcher.await, "dispatcher");

        sync_stop.cancel();
        joined(synchronizer.await, "synchronizer");

        ring.stop().await;

        let Some(listener) = listener else {
            return Err(io::Error::other("connection dispatcher terminated abnormally").into());
        };
        listener.release();

        info!("Proxy stopped");
        Ok(())
    }
}

/// The task's output, or `None` once its abnormal termination is logged.
fn joined<T>(result: std::result::Result<T, JoinError>, task: &str) -> Option<T> {
    match result {
        Ok(output) => Some(output),
        Err(err) => {
            error!(task, error = %err, "Task terminated abnormally");
            None
        }
    }
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn run(
    config: ProxyConfig,
    loader: Arc<dyn MembershipLoader>,
    shutdown: CancellationToken,
) -> Result<()> {
    Proxy::bind(config, loader).await?.serve(shutdown).await
}

/// Accept connections until `stop` is cancelled or accepting fails, then hand the
/// listener back.
async fn accept_loop<D: Dialer>(
    listener: Listener,
    handler: Arc<ConnectionHandler<D>>,
    stop: CancellationToken,
) -> Listener {
    let mut next_id: u64 = 0;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(connection) => {
                next_id += 1;
                dispatch(Arc::clone(&handler), next_id, connection);
            }
            Err(err) => {
                error!(error = %err, "Accept failed, no longer accepting connections");
                break;
            }
        }
    }

    listener
}

/// Spawn the handler task for one accepted connection.
fn dispatch<D: Dialer>(handler: Arc<ConnectionHandler<D>>, conn_id: u64, connection: Accepted) {
    match connection {
        Accepted::Tcp { stream, peer } => {
            debug!(conn = conn_id, %peer, "Accepted connection");
            if let Err(err) = stream.set_nodelay(true) {
                debug!(conn = conn_id, error = %err, "Failed to set TCP_NODELAY");
            }
            tokio::spawn(async move {
                handler.handle(conn_id, stream).await;
            });
        }
        Accepted::Unix { stream } => {
            debug!(conn = conn_id, "Accepted connection");
            tokio::spawn(async move {
                handler.handle(conn_id, stream).await;
            });
        }
    }
}
