//! Membership sourcing and periodic synchronization.
//!
//! A [`MembershipLoader`] produces the current endpoint list on demand; the synchronizer
//! polls it on a fixed period and pushes changes into the ring.

mod loader;
mod synchronizer;

pub use loader::{
    expand_port_template, parse_endpoint_list, FileLoader, MembershipLoader, StaticLoader,
};
pub use synchronizer::{spawn_synchronizer, sync_once};
