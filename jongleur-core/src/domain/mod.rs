//! Domain models shared by the ring and the proxy.

pub mod endpoint;
pub mod membership;
