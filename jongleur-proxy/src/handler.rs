//! Per-connection routing: select, dial with bounded retries, relay or give up.
//!
//! A connection moves through selecting an endpoint (bounded wait), dialing it (bounded
//! timeout) and relaying. A failed dial goes back to selection until the attempt budget is
//! spent. When no endpoint can be selected in time, or every attempt failed, the client
//! receives [`SERVICE_UNAVAILABLE`] instead. The client connection is closed either way.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use jongleur_core::patch::PatcherFactory;
use jongleur_core::{Endpoint, Selector};

use crate::dialer::Dialer;
use crate::relay::{relay, RelayStats};

/// Written to clients that could not be routed.
pub const SERVICE_UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service unavailable\n";

/// Per-connection line: at info level in verbose mode, debug level otherwise.
macro_rules! connection_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Timeouts and retry budget of the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// How long to wait for the ring to hand out an endpoint.
    pub select_wait: Duration,
    /// Connect timeout per dial attempt.
    pub dial_timeout: Duration,
    /// Maximum dial attempts per client connection.
    pub max_attempts: u32,
    /// Log every connection step at info level.
    pub verbose: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            select_wait: Duration::from_secs(1),
            dial_timeout: Duration::from_secs(2),
            max_attempts: 10,
            verbose: false,
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The connection was relayed to `endpoint` until both sides finished.
    Relayed {
        /// The backend that served the connection.
        endpoint: Endpoint,
        /// Dial attempts made, including the successful one.
        attempts: u32,
        /// Bytes relayed in each direction.
        stats: RelayStats,
    },
    /// The client received the 503 line.
    Unavailable {
        /// Dial attempts made before giving up.
        attempts: u32,
    },
}

/// Routes client connections to endpoints pulled from the ring.
pub struct ConnectionHandler<D> {
    selector: Selector,
    dialer: D,
    settings: HandlerSettings,
    request_patcher: PatcherFactory,
    response_patcher: PatcherFactory,
}

impl<D: Dialer> ConnectionHandler<D> {
    /// Create a handler.
    pub fn new(
        selector: Selector,
        dialer: D,
        settings: HandlerSettings,
        request_patcher: PatcherFactory,
        response_patcher: PatcherFactory,
    ) -> Self {
        Self {
            selector,
            dialer,
            settings,
            request_patcher,
            response_patcher,
        }
    }

    /// Serve one client connection to completion.
    pub async fn handle<C>(&self, conn_id: u64, mut client: C) -> Outcome
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let verbose = self.settings.verbose;
        let mut attempts = 0;

        while attempts < self.settings.max_attempts {
            let Some(endpoint) = self.selector.next(self.settings.select_wait).await else {
                connection_event!(verbose, conn = conn_id, attempts, "No endpoint available");
                break;
            };
            attempts += 1;

            connection_event!(verbose, conn = conn_id, attempt = attempts, %endpoint, "Dialing");
            let dial = self.dialer.dial(&endpoint);
            let backend = match tokio::time::timeout(self.settings.dial_timeout, dial).await {
                Ok(Ok(backend)) => backend,
                Ok(Err(err)) => {
                    warn!(conn = conn_id, %endpoint, error = %err, "Connection to host failed");
                    continue;
                }
                Err(_) => {
                    warn!(
                        conn = conn_id,
                        %endpoint,
                        error = "connect timed out",
                        "Connection to host failed"
                    );
                    continue;
                }
            };

            connection_event!(
                verbose,
                conn = conn_id,
                attempt = attempts,
                %endpoint,
                "Connected, relaying"
            );
            let stats = relay(
                client,
                backend,
                (self.request_patcher)(),
                (self.response_patcher)(),
            )
            .await;
            connection_event!(
                verbose,
                conn = conn_id,
                %endpoint,
                sent = stats.sent,
                received = stats.received,
                "Relay finished"
            );

            return Outcome::Relayed {
                endpoint,
                attempts,
                stats,
            };
        }

        connection_event!(verbose, conn = conn_id, attempts, "Service unavailable");
        let _ = client.write_all(SERVICE_UNAVAILABLE).await;
        let _ = client.shutdown().await;
        Outcome::Unavailable { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jongleur_core::patch::{identity_factory, AddressPatcher};
    use jongleur_core::MutableRing;
    use std::collections::HashSet;
    use std::io;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::sync::{Arc, Mutex};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    /// Healthy endpoints answer with "<endpoint>:<request length>"; the rest refuse.
    #[derive(Default)]
    struct ScriptedDialer {
        healthy: HashSet<String>,
        hang: bool,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedDialer {
        fn healthy(addrs: &[&str]) -> Self {
            Self {
                healthy: addrs.iter().map(|a| a.to_string()).collect(),
                ..Self::default()
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dialer for Arc<ScriptedDialer> {
        type Conn = DuplexStream;

        async fn dial(&self, endpoint: &Endpoint) -> io::Result<DuplexStream> {
            self.attempts.lock().unwrap().push(endpoint.to_string());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if !self.healthy.contains(endpoint.as_str()) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }

            let (proxy_side, mut backend_side) = duplex(1024);
            let name = endpoint.to_string();
            tokio::spawn(async move {
                let mut request = Vec::new();
                backend_side.read_to_end(&mut request).await.unwrap();
                let reply = format!("{name}:{}", request.len());
                backend_side.write_all(reply.as_bytes()).await.unwrap();
                backend_side.shutdown().await.unwrap();
            });
            Ok(proxy_side)
        }
    }

    fn endpoints(addrs: &[&str]) -> Vec<Endpoint> {
        addrs.iter().map(|a| Endpoint::new(a).unwrap()).collect()
    }

    async fn ring_with(addrs: &[&str]) -> MutableRing {
        let ring = MutableRing::new();
        ring.sync(endpoints(addrs)).await;
        ring
    }

    fn handler(
        ring: &MutableRing,
        dialer: &Arc<ScriptedDialer>,
    ) -> ConnectionHandler<Arc<ScriptedDialer>> {
        ConnectionHandler::new(
            ring.selector(),
            Arc::clone(dialer),
            HandlerSettings::default(),
            identity_factory(),
            identity_factory(),
        )
    }

    /// Run one client exchange: send `request`, half-close, read everything back.
    async fn exchange<D: Dialer>(
        handler: &ConnectionHandler<D>,
        conn_id: u64,
        request: &[u8],
    ) -> (Outcome, Vec<u8>) {
        let (mut client_app, client_proxy) = duplex(1024);
        let client = async {
            client_app.write_all(request).await.unwrap();
            client_app.shutdown().await.unwrap();
            let mut response = Vec::new();
            client_app.read_to_end(&mut response).await.unwrap();
            response
        };
        tokio::join!(handler.handle(conn_id, client_proxy), client)
    }

    #[tokio::test]
    async fn test_relays_to_healthy_endpoint() {
        let ring = ring_with(&["a:1"]).await;
        let dialer = Arc::new(ScriptedDialer::healthy(&["a:1"]));
        let handler = handler(&ring, &dialer);

        let (outcome, response) = exchange(&handler, 1, b"ping").await;
        assert_eq!(response, b"a:1:4");
        assert_eq!(
            outcome,
            Outcome::Relayed {
                endpoint: Endpoint::new("a:1").unwrap(),
                attempts: 1,
                stats: RelayStats { sent: 4, received: 5 },
            }
        );
        ring.stop().await;
    }

    #[tokio::test]
    async fn test_failing_endpoint_dialed_once_per_connection() {
        let ring = ring_with(&["a:1", "b:1"]).await;
        let dialer = Arc::new(ScriptedDialer::healthy(&["b:1"]));
        let handler = handler(&ring, &dialer);

        for conn_id in 1..=3 {
            let (outcome, response) = exchange(&handler, conn_id, b"x").await;
            assert_eq!(response, b"b:1:1");
            assert!(matches!(outcome, Outcome::Relayed { attempts: 2, .. }));
        }
        assert_eq!(dialer.attempts(), vec!["a:1", "b:1", "a:1", "b:1", "a:1", "b:1"]);
        ring.stop().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_get_503_after_ten_attempts() {
        let ring = ring_with(&["a:1", "b:1"]).await;
        let dialer = Arc::new(ScriptedDialer::healthy(&[]));
        let handler = handler(&ring, &dialer);

        let (outcome, response) = exchange(&handler, 1, b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, SERVICE_UNAVAILABLE);
        assert_eq!(outcome, Outcome::Unavailable { attempts: 10 });
        assert_eq!(dialer.attempts().len(), 10);
        ring.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_ring_gets_503_after_select_wait() {
        let ring = MutableRing::new();
        let dialer = Arc::new(ScriptedDialer::healthy(&["a:1"]));
        let handler = handler(&ring, &dialer);

        let started = tokio::time::Instant::now();
        let (outcome, response) = exchange(&handler, 1, b"").await;
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(response, SERVICE_UNAVAILABLE);
        assert_eq!(outcome, Outcome::Unavailable { attempts: 0 });
        assert!(dialer.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_dials_time_out() {
        let ring = ring_with(&["a:1"]).await;
        let dialer = Arc::new(ScriptedDialer {
            hang: true,
            ..ScriptedDialer::default()
        });
        let handler = handler(&ring, &dialer);

        let started = tokio::time::Instant::now();
        let (outcome, response) = exchange(&handler, 1, b"").await;
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(response, SERVICE_UNAVAILABLE);
        assert_eq!(outcome, Outcome::Unavailable { attempts: 10 });
        ring.stop().await;
    }

    #[tokio::test]
    async fn test_attempt_budget_is_configurable() {
        let ring = ring_with(&["a:1"]).await;
        let dialer = Arc::new(ScriptedDialer::healthy(&[]));
        let handler = ConnectionHandler::new(
            ring.selector(),
            Arc::clone(&dialer),
            HandlerSettings {
                max_attempts: 3,
                verbose: true,
                ..HandlerSettings::default()
            },
            identity_factory(),
            identity_factory(),
        );

        let (outcome, _) = exchange(&handler, 1, b"").await;
        assert_eq!(outcome, Outcome::Unavailable { attempts: 3 });
        assert_eq!(dialer.attempts().len(), 3);
        ring.stop().await;
    }

    #[tokio::test]
    async fn test_request_patcher_rewrites_what_the_backend_receives() {
        let ring = ring_with(&["a:1"]).await;
        let dialer = Arc::new(ScriptedDialer::healthy(&["a:1"]));
        let addr = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 80);
        let handler = ConnectionHandler::new(
            ring.selector(),
            Arc::clone(&dialer),
            HandlerSettings::default(),
            AddressPatcher::factory(addr, 0),
            identity_factory(),
        );

        let (outcome, response) = exchange(&handler, 1, b"ping").await;
        assert_eq!(response, b"a:1:10");
        assert!(matches!(
            outcome,
            Outcome::Relayed {
                stats: RelayStats { sent: 10, received: 6 },
                ..
            }
        ));
        ring.stop().await;
    }

    #[tokio::test]
    async fn test_each_connection_gets_fresh_patchers() {
        let ring = ring_with(&["a:1"]).await;
        let dialer = Arc::new(ScriptedDialer::healthy(&["a:1"]));
        let addr = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 258);
        let handler = ConnectionHandler::new(
            ring.selector(),
            Arc::clone(&dialer),
            HandlerSettings::default(),
            identity_factory(),
            AddressPatcher::factory(addr, 2),
        );

        for conn_id in 1..=2 {
            let (_, response) = exchange(&handler, conn_id, b"").await;
            assert_eq!(response, b"a:\x01\x02\x7f\x00\x00\x011:0");
        }
        ring.stop().await;
    }
}
