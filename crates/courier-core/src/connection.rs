//! Connections between interfaces
//!
//! A [`Connection`] is one contact between two interfaces of the same type.
//! It is created UP when the interfaces come into range, carries at most one
//! message transfer at a time, and goes DOWN (terminally) when the contact is
//! lost. A later re-contact between the same interfaces creates a fresh
//! connection with a fresh id.
//!
//! Transfer progress is durable state on the connection: bytes accumulate
//! across ticks at the slower of the two interface speeds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{ConnectionSnapshot, TransferSnapshot};
use crate::message::Message;
use crate::types::{ConnectionId, HostAddress, InterfaceRef};

/// Tolerance when comparing accumulated bytes against a message size
const BYTE_EPSILON: f64 = 1e-9;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Up,
    Down,
}

/// A message in flight over a connection
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Wire copy of the message; the sender keeps its own buffered copy
    pub message: Message,
    pub from: HostAddress,
    pub to: HostAddress,
    pub bytes_done: f64,
    pub started_at: f64,
}

impl Transfer {
    /// Whole bytes still to be sent
    pub fn bytes_remaining(&self) -> u64 {
        let left = self.message.size() as f64 - self.bytes_done;
        if left <= BYTE_EPSILON {
            0
        } else {
            left.ceil() as u64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_remaining() == 0
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            message: self.message.id().clone(),
            from: self.from,
            to: self.to,
            bytes_done: self.bytes_done,
            total: self.message.size(),
        }
    }
}

/// A transfer cut short by the connection going down
#[derive(Debug, Clone)]
pub struct AbortedTransfer {
    pub transfer: Transfer,
    pub bytes_remaining: u64,
}

/// One contact between two interfaces
///
/// The endpoints are stored in ascending order so that `(a, b)` identifies
/// the unordered pair.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    a: InterfaceRef,
    b: InterfaceRef,
    state: ConnectionState,
    speed: f64,
    opened_at: f64,
    closed_at: Option<f64>,
    transfer: Option<Transfer>,
}

impl Connection {
    /// Open a connection between two interfaces at `now`
    pub fn new(id: ConnectionId, x: InterfaceRef, y: InterfaceRef, speed: f64, now: f64) -> Self {
        debug_assert!(x.host != y.host, "connection between interfaces of one host");
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            id,
            a,
            b,
            state: ConnectionState::Up,
            speed,
            opened_at: now,
            closed_at: None,
            transfer: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Normalized key of the unordered interface pair
    pub fn key(&self) -> (InterfaceRef, InterfaceRef) {
        (self.a, self.b)
    }

    pub fn a(&self) -> InterfaceRef {
        self.a
    }

    pub fn b(&self) -> InterfaceRef {
        self.b
    }

    /// Endpoint hosts, lower address first
    pub fn hosts(&self) -> (HostAddress, HostAddress) {
        (self.a.host, self.b.host)
    }

    pub fn involves(&self, host: HostAddress) -> bool {
        self.a.host == host || self.b.host == host
    }

    /// The endpoint host that is not `host`
    pub fn other_host(&self, host: HostAddress) -> HostAddress {
        debug_assert!(self.involves(host), "{host} is not an endpoint of {}", self.id);
        if self.a.host == host { self.b.host } else { self.a.host }
    }

    /// The endpoint interface that does not belong to `host`
    pub fn other_interface(&self, host: HostAddress) -> InterfaceRef {
        if self.a.host == host { self.b } else { self.a }
    }

    /// The endpoint interface that belongs to `host`
    pub fn own_interface(&self, host: HostAddress) -> InterfaceRef {
        if self.a.host == host { self.a } else { self.b }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state == ConnectionState::Up
    }

    /// Bytes per second available to a transfer
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn opened_at(&self) -> f64 {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<f64> {
        self.closed_at
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    /// Begin sending `message` from `from` to the other endpoint
    ///
    /// The connection must be up and idle.
    pub fn start_transfer(&mut self, from: HostAddress, message: Message, now: f64) {
        debug_assert!(self.is_up(), "transfer started on {} while down", self.id);
        debug_assert!(
            self.transfer.is_none(),
            "second transfer started on busy connection {}",
            self.id
        );
        let to = self.other_host(from);
        self.transfer = Some(Transfer {
            message,
            from,
            to,
            bytes_done: 0.0,
            started_at: now,
        });
    }

    /// Credit `dt` seconds of progress to the active transfer
    ///
    /// Returns the transfer once every byte has been sent; the connection is
    /// idle again afterwards.
    pub fn advance(&mut self, dt: f64) -> Option<Transfer> {
        let transfer = self.transfer.as_mut()?;
        let size = transfer.message.size() as f64;
        transfer.bytes_done = (transfer.bytes_done + self.speed * dt).min(size);
        if transfer.is_complete() {
            self.transfer.take()
        } else {
            None
        }
    }

    /// Take the connection down, aborting any transfer in progress
    pub fn tear_down(&mut self, now: f64) -> Option<AbortedTransfer> {
        self.state = ConnectionState::Down;
        self.closed_at = Some(now);
        self.transfer.take().map(|transfer| {
            let bytes_remaining = transfer.bytes_remaining();
            AbortedTransfer {
                transfer,
                bytes_remaining,
            }
        })
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.id,
            a: self.a,
            b: self.b,
            state: self.state,
            speed: self.speed,
            opened_at: self.opened_at,
            transfer: self.transfer.as_ref().map(Transfer::snapshot),
        }
    }
}

/// The live connections of a run, indexed by id and by interface pair
///
/// At most one live connection exists per unordered interface pair.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    live: BTreeMap<ConnectionId, Connection>,
    by_pair: BTreeMap<(InterfaceRef, InterfaceRef), ConnectionId>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly opened connection
    ///
    /// Returns `false` (and drops the connection) if its pair is already live.
    pub fn open(&mut self, connection: Connection) -> bool {
        let key = connection.key();
        if self.by_pair.contains_key(&key) {
            return false;
        }
        self.by_pair.insert(key, connection.id());
        self.live.insert(connection.id(), connection);
        true
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.live.get_mut(&id)
    }

    /// The live connection between two interfaces, in either order
    pub fn find(&self, x: InterfaceRef, y: InterfaceRef) -> Option<ConnectionId> {
        let key = if x <= y { (x, y) } else { (y, x) };
        self.by_pair.get(&key).copied()
    }

    /// Remove a connection from the table, returning it
    pub fn close(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.live.remove(&id)?;
        self.by_pair.remove(&connection.key());
        Some(connection)
    }

    /// Live connection ids in ascending order
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.live.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.by_pair.clear();
    }
}
