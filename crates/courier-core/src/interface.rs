//! Network interfaces and range-based contact detection
//!
//! An interface is one radio on a host. Two interfaces may be connected when
//! they share an interface type and the distance between their hosts is at
//! most the smaller of the two transmission ranges.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::coord::Coord;
use crate::error::ConfigError;
use crate::types::{ConnectionId, HostAddress, InterfaceRef};

/// Configured prototype of an interface, replicated onto every host that uses it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    /// Interface-type tag; only interfaces with equal tags can connect
    pub interface_type: String,
    /// Transmission range in metres
    pub range: f64,
    /// Transmission speed in bytes per second
    pub speed: f64,
}

impl InterfaceSpec {
    pub fn new(interface_type: impl Into<String>, range: f64, speed: f64) -> Self {
        Self {
            interface_type: interface_type.into(),
            range,
            speed,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface_type.is_empty() {
            return Err(ConfigError::invalid_value("interface_type", "must not be empty"));
        }
        if !self.range.is_finite() || self.range < 0.0 {
            return Err(ConfigError::invalid_value(
                format!("{}.range", self.interface_type),
                format!("{} is not a non-negative distance", self.range),
            ));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ConfigError::invalid_value(
                format!("{}.speed", self.interface_type),
                format!("{} is not a positive rate", self.speed),
            ));
        }
        Ok(())
    }
}

/// A radio on one host and the connections currently open on it
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    host: HostAddress,
    index: usize,
    interface_type: String,
    range: f64,
    speed: f64,
    connections: BTreeSet<ConnectionId>,
}

impl NetworkInterface {
    /// Instantiate a prototype for `host` at position `index` in its interface list
    pub fn replicate(spec: &InterfaceSpec, host: HostAddress, index: usize) -> Self {
        Self {
            host,
            index,
            interface_type: spec.interface_type.clone(),
            range: spec.range,
            speed: spec.speed,
            connections: BTreeSet::new(),
        }
    }

    /// Owning host (back-reference by address)
    pub fn host(&self) -> HostAddress {
        self.host
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn interface_ref(&self) -> InterfaceRef {
        InterfaceRef::new(self.host, self.index)
    }

    pub fn interface_type(&self) -> &str {
        &self.interface_type
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Rate a transfer between this interface and `other` can run at
    pub fn transmit_speed_with(&self, other: &NetworkInterface) -> f64 {
        self.speed.min(other.speed)
    }

    /// Is `other` close enough, given both hosts' locations?
    pub fn is_within_range(&self, own: &Coord, other: &NetworkInterface, other_location: &Coord) -> bool {
        own.distance(other_location) <= self.range.min(other.range)
    }

    /// Can this interface hold a connection to `other`?
    ///
    /// Requires a different host, a matching interface type and range.
    pub fn can_connect(&self, own: &Coord, other: &NetworkInterface, other_location: &Coord) -> bool {
        self.host != other.host
            && self.interface_type == other.interface_type
            && self.is_within_range(own, other, other_location)
    }

    /// Connections currently open on this interface, in id order
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn has_connection(&self, id: ConnectionId) -> bool {
        self.connections.contains(&id)
    }

    /// Register a newly opened connection. Returns `false` if it was already attached.
    pub fn attach(&mut self, id: ConnectionId) -> bool {
        self.connections.insert(id)
    }

    /// Forget a closed connection. Returns `false` if it was not attached.
    pub fn detach(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id)
    }
}
