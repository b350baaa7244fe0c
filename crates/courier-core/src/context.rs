//! Run-scoped state
//!
//! Everything that the engine needs to share across hosts lives here instead
//! of in process-wide statics. A [`RunContext`] is created (or reset) at the
//! start of every run and handed to the constructors that need it:
//!
//! - the host address counter, so addresses form a bijection onto `0..N`
//! - the connection id counter, so ids are never reused within a run
//! - named [`DiscoveryRegistry`] instances shared by every replica of a
//!   decision engine
//!
//! ## Reset semantics
//!
//! [`RunContext::reset`] rewinds both counters to zero and empties every
//! registry in place. Registry handles obtained before the reset stay valid
//! and observe the emptied state, so engines constructed for the previous run
//! never see stale discoveries.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{ConnectionId, HostAddress};

/// Counters and shared registries for one simulation run
#[derive(Debug, Default)]
pub struct RunContext {
    next_address: u32,
    next_connection: u64,
    registries: BTreeMap<String, DiscoveryRegistry>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next host address
    pub fn next_address(&mut self) -> HostAddress {
        let address = HostAddress(self.next_address);
        self.next_address += 1;
        address
    }

    /// Number of addresses handed out since the last reset
    pub fn host_count(&self) -> usize {
        self.next_address as usize
    }

    /// Allocate the next connection id
    pub fn next_connection_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        id
    }

    /// Get (creating on first use) the registry shared under `key`
    pub fn discovery_registry(&mut self, key: &str) -> DiscoveryRegistry {
        self.registries
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Rewind the counters and clear every registry for a new run
    pub fn reset(&mut self) {
        debug!(
            hosts = self.next_address,
            connections = self.next_connection,
            registries = self.registries.len(),
            "Resetting run context"
        );
        self.next_address = 0;
        self.next_connection = 0;
        for registry in self.registries.values() {
            registry.clear();
        }
    }
}

/// One discovered host
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub host: HostAddress,
    pub name: String,
    /// Simulation time of the first discovery
    pub time: f64,
    /// Host that made the first discovery
    pub discovered_by: HostAddress,
}

#[derive(Debug, Default)]
struct DiscoveryState {
    discovered: BTreeMap<HostAddress, Discovery>,
}

/// Set of discovered hosts shared by all replicas of a decision engine
///
/// Cloning a registry clones the handle, not the contents.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRegistry {
    inner: Arc<RwLock<DiscoveryState>>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovery. Returns `true` the first time a host is discovered.
    pub fn record(&self, host: HostAddress, name: &str, discovered_by: HostAddress, time: f64) -> bool {
        let mut state = self.inner.write();
        if state.discovered.contains_key(&host) {
            return false;
        }
        state.discovered.insert(
            host,
            Discovery {
                host,
                name: name.to_string(),
                time,
                discovered_by,
            },
        );
        true
    }

    pub fn contains(&self, host: HostAddress) -> bool {
        self.inner.read().discovered.contains_key(&host)
    }

    /// Discoveries in address order
    pub fn discovered(&self) -> Vec<Discovery> {
        self.inner.read().discovered.values().cloned().collect()
    }

    /// Time of the earliest discovery, if any
    pub fn initial_discovery(&self) -> Option<f64> {
        self.inner
            .read()
            .discovered
            .values()
            .map(|d| d.time)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.inner.read().discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().discovered.is_empty()
    }

    /// Forget every discovery
    pub fn clear(&self) {
        self.inner.write().discovered.clear();
    }

    /// Do two handles point at the same registry?
    pub fn same_registry(&self, other: &DiscoveryRegistry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
