//! Jongleur Proxy Engine
//!
//! A TCP load balancing proxy with dynamic backend membership. A membership loader is polled
//! on a fixed period, the resulting endpoints feed a round-robin ring, and every accepted
//! connection is routed to the next endpoint with bounded retries, its bytes relayed through
//! optional per-direction patchers.

pub mod config;
pub mod dialer;
pub mod error;
pub mod handler;
pub mod listen;
pub mod membership;
pub mod relay;
pub mod server;

pub use config::{ceph_response_patcher, ProxyConfig};
pub use error::{ProxyError, Result};
pub use handler::{ConnectionHandler, HandlerSettings, Outcome, SERVICE_UNAVAILABLE};
pub use listen::{ListenAddr, Listener};
pub use server::{run, Proxy};
