//! Byte-stream patchers applied to relayed data.
//!
//! A patcher sits between the read side and the write side of one relay direction. It is
//! created once per connection and direction and sees every chunk read from the source in
//! order, so it may keep state across chunks. Its output must not depend on how the source
//! happened to chunk the stream.

use std::sync::Arc;

mod address;

pub use address::{AddressPatcher, CEPH_MONITOR_SKIP};

/// A resumable transform from bytes read to bytes written.
pub trait Patcher: Send {
    /// Append the bytes to write for `input` to `output`.
    fn patch(&mut self, input: &[u8], output: &mut Vec<u8>);
}

/// Creates a fresh patcher for each connection direction.
pub type PatcherFactory = Arc<dyn Fn() -> Box<dyn Patcher> + Send + Sync>;

/// Passes every byte through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Patcher for Identity {
    fn patch(&mut self, input: &[u8], output: &mut Vec<u8>) {
        output.extend_from_slice(input);
    }
}

/// A factory producing [`Identity`] patchers.
pub fn identity_factory() -> PatcherFactory {
    Arc::new(|| Box::new(Identity))
}

/// Feed `chunks` through `patcher` and collect everything it writes.
pub fn patch_all<'a>(
    patcher: &mut dyn Patcher,
    chunks: impl IntoIterator<Item = &'a [u8]>,
) -> Vec<u8> {
    let mut output = Vec::new();
    for chunk in chunks {
        patcher.patch(chunk, &mut output);
    }
    output
}
