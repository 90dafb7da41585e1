//! Proxy configuration.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use jongleur_core::patch::{identity_factory, AddressPatcher, PatcherFactory, CEPH_MONITOR_SKIP};

use crate::error::{ProxyError, Result};
use crate::handler::HandlerSettings;
use crate::listen::ListenAddr;

/// Everything needed to run a proxy.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Where to accept client connections.
    pub listen: ListenAddr,
    /// Membership synchronization period; must be positive.
    pub period: Duration,
    /// Per-connection timeouts and retry budget.
    pub handler: HandlerSettings,
    /// Applied to client-to-backend bytes.
    pub request_patcher: PatcherFactory,
    /// Applied to backend-to-client bytes.
    pub response_patcher: PatcherFactory,
}

impl ProxyConfig {
    /// A configuration with default handler settings and identity patchers.
    pub fn new(listen: ListenAddr, period: Duration) -> Self {
        Self {
            listen,
            period,
            handler: HandlerSettings::default(),
            request_patcher: identity_factory(),
            response_patcher: identity_factory(),
        }
    }

    /// Enable or disable verbose per-connection logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.handler.verbose = verbose;
        self
    }

    /// Replace the handler settings.
    pub fn with_handler_settings(mut self, handler: HandlerSettings) -> Self {
        self.handler = handler;
        self
    }

    /// Set the request-direction patcher.
    pub fn with_request_patcher(mut self, patcher: PatcherFactory) -> Self {
        self.request_patcher = patcher;
        self
    }

    /// Set the response-direction patcher.
    pub fn with_response_patcher(mut self, patcher: PatcherFactory) -> Self {
        self.response_patcher = patcher;
        self
    }

    /// Reject configurations the proxy cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(ProxyError::usage("\"period\" must be positive"));
        }
        if self.handler.max_attempts == 0 {
            return Err(ProxyError::usage("at least one dial attempt is required"));
        }
        Ok(())
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("listen", &self.listen)
            .field("period", &self.period)
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

/// Response patcher advertising the proxy as the Ceph monitor.
///
/// Monitors announce their own address in the banner; rewriting it with the listen address
/// keeps clients talking to the proxy. Requires a TCP listen address with a literal IPv4
/// host and port.
pub fn ceph_response_patcher(listen: &ListenAddr) -> Result<PatcherFactory> {
    let ListenAddr::Tcp { addr, .. } = listen else {
        return Err(ProxyError::usage(format!(
            "TCP address is required for Ceph mode: {listen}"
        )));
    };

    let socket: SocketAddr = addr.parse().map_err(|err| {
        ProxyError::usage(format!("failed to parse TCP address \"{addr}\": {err}"))
    })?;

    match socket {
        SocketAddr::V4(monitor) => Ok(AddressPatcher::factory(monitor, CEPH_MONITOR_SKIP)),
        SocketAddr::V6(_) => Err(ProxyError::usage(format!(
            "IPv4 monitor address is required for Ceph mode: {addr}"
        ))),
    }
}
