//! Round-robin endpoint selection.
//!
//! A [`ring::Ring`] cycles through a fixed endpoint list, a producer task hands its endpoints
//! out one at a time through a [`selector::Selector`], and a [`mutable_ring::MutableRing`]
//! swaps rings as membership changes.

pub mod mutable_ring;
pub mod ring;
pub mod selector;
