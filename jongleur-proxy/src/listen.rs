//! Listen address parsing and listener binding.
//!
//! Addresses take the form `[<network>@]<address>`. The network is `tcp` (the default),
//! `tcp4`, `tcp6` or `unix`; unix addresses are socket paths whose parent directory is
//! created on demand.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use tokio::net::{lookup_host, TcpListener, TcpStream, UnixListener, UnixStream};
use tracing::warn;

use crate::error::{ProxyError, Result};

/// Restricts TCP binding to one address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    /// IPv4 only (`tcp4`).
    V4,
    /// IPv6 only (`tcp6`).
    V6,
}

impl IpFamily {
    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// A parsed listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// A TCP `host:port`, optionally restricted to one family.
    Tcp {
        /// The `host:port` to resolve and bind.
        addr: String,
        /// Family restriction, `None` for plain `tcp`.
        family: Option<IpFamily>,
    },
    /// A unix domain socket path.
    Unix(PathBuf),
}

impl FromStr for ListenAddr {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        let (network, addr) = s.split_once('@').unwrap_or(("tcp", s));
        if addr.is_empty() {
            return Err(ProxyError::usage(format!("listen address is empty: \"{s}\"")));
        }

        let tcp = |family| ListenAddr::Tcp {
            addr: addr.to_string(),
            family,
        };
        match network {
            "tcp" => Ok(tcp(None)),
            "tcp4" => Ok(tcp(Some(IpFamily::V4))),
            "tcp6" => Ok(tcp(Some(IpFamily::V6))),
            "unix" => Ok(ListenAddr::Unix(PathBuf::from(addr))),
            other => Err(ProxyError::usage(format!(
                "unsupported network \"{other}\"; expected \"tcp\", \"tcp4\", \"tcp6\" or \"unix\""
            ))),
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { addr, family: None } => write!(f, "tcp@{addr}"),
            Self::Tcp {
                addr,
                family: Some(IpFamily::V4),
            } => write!(f, "tcp4@{addr}"),
            Self::Tcp {
                addr,
                family: Some(IpFamily::V6),
            } => write!(f, "tcp6@{addr}"),
            Self::Unix(path) => write!(f, "unix@{}", path.display()),
        }
    }
}

/// `:port` means every local interface of the family.
fn with_wildcard_host(host_port: &str, family: Option<IpFamily>) -> String {
    match host_port.strip_prefix(':') {
        Some(port) if family == Some(IpFamily::V6) => format!("[::]:{port}"),
        Some(port) => format!("0.0.0.0:{port}"),
        None => host_port.to_string(),
    }
}

/// A bound listener.
#[derive(Debug)]
pub enum Listener {
    /// A TCP listener.
    Tcp(TcpListener),
    /// A unix socket listener and the path it owns.
    Unix {
        /// The bound listener.
        listener: UnixListener,
        /// The socket file, removed on release.
        path: PathBuf,
    },
}

/// An accepted client connection.
#[derive(Debug)]
pub(crate) enum Accepted {
    Tcp { stream: TcpStream, peer: SocketAddr },
    Unix { stream: UnixStream },
}

impl Listener {
    /// Bind the listener for `addr`.
    pub async fn bind(addr: &ListenAddr) -> Result<Self> {
        let bind_error = |source| ProxyError::Bind {
            addr: addr.to_string(),
            source,
        };

        match addr {
            ListenAddr::Tcp {
                addr: host_port,
                family,
            } => {
                let mut last_error = None;
                let target = with_wildcard_host(host_port, *family);
                for candidate in lookup_host(target.as_str()).await.map_err(bind_error)? {
                    if family.is_some_and(|family| !family.matches(&candidate)) {
                        continue;
                    }
                    match TcpListener::bind(candidate).await {
                        Ok(listener) => return Ok(Self::Tcp(listener)),
                        Err(err) => last_error = Some(err),
                    }
                }
                Err(bind_error(last_error.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        "no address of the requested family",
                    )
                })))
            }
            ListenAddr::Unix(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::DirBuilder::new()
                        .recursive(true)
                        .mode(0o755)
                        .create(parent)
                        .await
                        .map_err(bind_error)?;
                }
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }

    /// The address actually bound, e.g. with the port chosen for `:0`.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Self::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            Self::Unix { path, .. } => Ok(path.display().to_string()),
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<Accepted> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok(Accepted::Tcp { stream, peer })
            }
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Unix { stream })
            }
        }
    }

    /// Close the listener, removing a unix socket file.
    pub fn release(self) {
        if let Self::Unix { listener, path } = self {
            drop(listener);
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "Failed to remove socket file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_network_is_tcp() {
        let addr: ListenAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(
            addr,
            ListenAddr::Tcp {
                addr: "0.0.0.0:8080".to_string(),
                family: None
            }
        );
        assert_eq!(addr.to_string(), "tcp@0.0.0.0:8080");
    }

    #[test]
    fn test_explicit_networks() {
        let tcp4: ListenAddr = "tcp4@127.0.0.1:80".parse().unwrap();
        assert_eq!(tcp4.to_string(), "tcp4@127.0.0.1:80");

        let tcp6: ListenAddr = "tcp6@[::1]:80".parse().unwrap();
        assert!(matches!(tcp6, ListenAddr::Tcp { family: Some(IpFamily::V6), .. }));

        let unix: ListenAddr = "unix@/run/jongleur/proxy.sock".parse().unwrap();
        assert_eq!(unix, ListenAddr::Unix(PathBuf::from("/run/jongleur/proxy.sock")));
    }

    #[test]
    fn test_invalid_listen_addresses_are_usage_errors() {
        assert!("".parse::<ListenAddr>().unwrap_err().is_usage());
        assert!("unix@".parse::<ListenAddr>().unwrap_err().is_usage());
        assert!("udp@127.0.0.1:53".parse::<ListenAddr>().unwrap_err().is_usage());
    }

    #[tokio::test]
    async fn test_bind_tcp_ephemeral_port() {
        let listener = Listener::bind(&"127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local = listener.local_addr().unwrap();
        assert!(local.starts_with("127.0.0.1:"));
        assert!(!local.ends_with(":0"));
        listener.release();
    }

    #[tokio::test]
    async fn test_bind_empty_host_listens_on_all_interfaces() {
        let listener = Listener::bind(&":0".parse().unwrap()).await.unwrap();
        let local = listener.local_addr().unwrap();
        assert!(local.starts_with("0.0.0.0:"));
        assert!(!local.ends_with(":0"));
        listener.release();
    }

    #[test]
    fn test_wildcard_host_per_family() {
        assert_eq!(with_wildcard_host(":9000", None), "0.0.0.0:9000");
        assert_eq!(with_wildcard_host(":9000", Some(IpFamily::V4)), "0.0.0.0:9000");
        assert_eq!(with_wildcard_host(":9000", Some(IpFamily::V6)), "[::]:9000");
        assert_eq!(with_wildcard_host("127.0.0.1:9000", None), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_bind_wrong_family_fails() {
        let err = Listener::bind(&"tcp6@127.0.0.1:0".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_unix_bind_creates_parent_and_release_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/proxy.sock");
        let addr = ListenAddr::Unix(path.clone());

        let listener = Listener::bind(&addr).await.unwrap();
        assert!(path.exists());
        assert_eq!(listener.local_addr().unwrap(), path.display().to_string());

        listener.release();
        assert!(!path.exists());
    }
}
