//! Serializable views of the world at a tick boundary
//!
//! Snapshots own all their data, so observers can keep them around
//! without holding on to (or being able to change) engine state.

use serde::{Deserialize, Serialize};

use courier_core::{ConnectionId, ConnectionSnapshot, Coord, HostAddress, MessageSnapshot};
use courier_routing::RouterStats;

use crate::host::Host;

/// One host as observed at a tick boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub address: HostAddress,
    pub name: String,
    pub group: String,
    pub location: Coord,
    pub destination: Option<Coord>,
    /// Buffered messages in arrival order
    pub buffer: Vec<MessageSnapshot>,
    pub occupancy: f64,
    pub stats: RouterStats,
    pub connections: Vec<ConnectionId>,
}

impl From<&Host> for HostSnapshot {
    fn from(host: &Host) -> Self {
        Self {
            address: host.address(),
            name: host.name().to_string(),
            group: host.group().to_string(),
            location: host.location(),
            destination: host.destination(),
            buffer: host.router().messages().map(MessageSnapshot::from).collect(),
            occupancy: host.buffer_occupancy(),
            stats: *host.router().stats(),
            connections: host.connection_ids(),
        }
    }
}

/// The whole world as observed at a tick boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub time: f64,
    pub hosts: Vec<HostSnapshot>,
    pub connections: Vec<ConnectionSnapshot>,
}

impl WorldSnapshot {
    pub fn host(&self, address: HostAddress) -> Option<&HostSnapshot> {
        self.hosts.get(address.index())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
