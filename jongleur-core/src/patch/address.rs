//! Splices a fixed IPv4 address record into a stream.
//!
//! Used to advertise the proxy's own address in place of the backend's, for protocols whose
//! greeting carries the server address at a fixed offset (the Ceph monitor banner).

use std::net::SocketAddrV4;
use std::sync::Arc;

use super::{Patcher, PatcherFactory};

/// Offset of the address record in a Ceph monitor banner.
pub const CEPH_MONITOR_SKIP: usize = 19;

/// Writes the first `skip` bytes through, then the replacement record, then the rest.
///
/// The record is a big-endian port followed by the four IPv4 octets. It is inserted, no
/// original bytes are consumed in its place.
#[derive(Debug, Clone)]
pub struct AddressPatcher {
    skip: usize,
    replacement: Vec<u8>,
}

impl AddressPatcher {
    /// Build a patcher inserting `addr` after `skip` original bytes.
    pub fn new(addr: SocketAddrV4, skip: usize) -> Self {
        let mut replacement = Vec::with_capacity(6);
        replacement.extend_from_slice(&addr.port().to_be_bytes());
        replacement.extend_from_slice(&addr.ip().octets());
        Self { skip, replacement }
    }

    /// A factory producing a fresh patcher per connection.
    pub fn factory(addr: SocketAddrV4, skip: usize) -> PatcherFactory {
        Arc::new(move || Box::new(AddressPatcher::new(addr, skip)))
    }

    /// Whether the replacement record has been written.
    pub fn is_done(&self) -> bool {
        self.replacement.is_empty()
    }
}

impl Patcher for AddressPatcher {
    fn patch(&mut self, mut input: &[u8], output: &mut Vec<u8>) {
        if input.is_empty() {
            return;
        }

        if self.skip > 0 {
            let through = self.skip.min(input.len());
            output.extend_from_slice(&input[..through]);
            self.skip -= through;
            input = &input[through..];
        }

        if self.skip == 0 && !self.replacement.is_empty() {
            output.append(&mut self.replacement);
        }

        output.extend_from_slice(input);
    }
}
