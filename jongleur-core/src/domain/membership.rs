//! Membership index used to detect endpoint set changes.

use std::collections::HashSet;

use crate::domain::endpoint::Endpoint;

/// The set of endpoints currently considered live.
///
/// Only used for equality checks: order and duplicates never matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    index: HashSet<Endpoint>,
}

impl Membership {
    /// Build an index from a list of endpoints.
    pub fn from_endpoints(endpoints: &[Endpoint]) -> Self {
        Self {
            index: endpoints.iter().cloned().collect(),
        }
    }

    /// Whether `endpoints`, taken as a set, differs from this membership.
    pub fn differs(&self, endpoints: &[Endpoint]) -> bool {
        if endpoints.len() < self.index.len() {
            return true;
        }
        let mut seen = HashSet::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if !self.index.contains(endpoint) {
                return true;
            }
            seen.insert(endpoint);
        }
        seen.len() != self.index.len()
    }

    /// Number of distinct members.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Collapse duplicates, keeping the first occurrence of each endpoint in place.
pub fn dedup_endpoints(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut seen = HashSet::with_capacity(endpoints.len());
    endpoints
        .into_iter()
        .filter(|endpoint| seen.insert(endpoint.clone()))
        .collect()
}
