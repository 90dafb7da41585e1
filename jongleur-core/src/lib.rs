//! Jongleur Core functionality.
//!
//! This crate contains the endpoint and membership models, the hot-swappable round-robin
//! endpoint ring and the byte patchers that the Jongleur proxy applies to relayed streams.

pub mod domain;
pub mod error;
pub mod load_balancer;
pub mod patch;

pub use domain::endpoint::Endpoint;
pub use domain::membership::Membership;
pub use error::{CoreError, Result};
pub use load_balancer::mutable_ring::MutableRing;
pub use load_balancer::ring::Ring;
pub use load_balancer::selector::Selector;
