//! Backend endpoint model.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// A dialable backend address such as `10.0.0.7:8080`.
///
/// The address is opaque: only emptiness is rejected, anything else is left for the dialer
/// to interpret. Cloning is cheap since the string is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(Arc<str>);

impl Endpoint {
    /// Create an endpoint from an address, trimming surrounding whitespace.
    pub fn new(addr: impl AsRef<str>) -> Result<Self> {
        let addr = addr.as_ref().trim();
        if addr.is_empty() {
            return Err(CoreError::EmptyEndpoint);
        }
        Ok(Self(Arc::from(addr)))
    }

    /// The address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Endpoint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_address() {
        let endpoint = Endpoint::new("  10.0.0.1:80\n").unwrap();
        assert_eq!(endpoint.as_str(), "10.0.0.1:80");
        assert_eq!(endpoint.to_string(), "10.0.0.1:80");
    }

    #[test]
    fn test_endpoint_rejects_empty() {
        assert_eq!(Endpoint::new(""), Err(CoreError::EmptyEndpoint));
        assert_eq!("   ".parse::<Endpoint>(), Err(CoreError::EmptyEndpoint));
    }

    #[test]
    fn test_endpoint_is_opaque() {
        // No host:port parsing happens here.
        let endpoint: Endpoint = "/run/backend.sock".parse().unwrap();
        assert_eq!(endpoint.as_ref(), "/run/backend.sock");
    }
}
