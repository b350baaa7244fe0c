//! Identifier and descriptor types shared across the engine

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Network-layer address of a host
///
/// Addresses are handed out by [`RunContext`](crate::RunContext) and form a
/// bijection onto `0..N` for the `N` hosts of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostAddress(pub u32);

impl HostAddress {
    /// Position of the host in an address-indexed table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for HostAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one connection instance
///
/// Ids increase monotonically within a run and are never reused, so a
/// re-contact between the same two interfaces gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Reference to a network interface: the owning host and the interface's
/// position in that host's interface list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceRef {
    pub host: HostAddress,
    pub index: usize,
}

impl InterfaceRef {
    pub fn new(host: HostAddress, index: usize) -> Self {
        Self { host, index }
    }
}

impl std::fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.host, self.index)
    }
}

/// Read-only description of a host, handed to decision engines
///
/// Cloning is cheap: the strings are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub address: HostAddress,
    pub name: Arc<str>,
    pub group: Arc<str>,
    /// Kind tag of the host's mobility model (e.g. `"stationary"`)
    pub mobility: Arc<str>,
}

impl HostInfo {
    pub fn new(address: HostAddress, name: &str, group: &str, mobility: &str) -> Self {
        Self {
            address,
            name: Arc::from(name),
            group: Arc::from(group),
            mobility: Arc::from(mobility),
        }
    }
}

impl std::fmt::Display for HostInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
