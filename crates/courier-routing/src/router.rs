//! Per-host router: buffer plus message lifecycle
//!
//! The router owns the mechanics every strategy shares. The decision engine
//! is consulted at each gate, always in this order:
//!
//! 1. **Admission**: `new_message` for locally created messages,
//!    `should_save_received_message` for relayed ones (skipped when this host
//!    is the final destination)
//! 2. **Eviction**: if space is short, buffered messages are offered to
//!    `should_delete_old_message` oldest-received first (arrival order on
//!    ties), skipping any message currently being sent; each approved one is
//!    dropped until the new message fits
//! 3. **Forwarding**: `should_send_message_to_host`, per open connection
//! 4. **Post-transfer**: `is_final_dest` at the receiver, then
//!    `should_delete_sent_message` at the sender
//!
//! ## Forwarding scan order
//!
//! Messages addressed to the peer come first, then the rest; both groups in
//! arrival order. Skipped are messages whose path already contains the
//! peer, expired messages, messages the peer refused earlier in the same
//! contact and messages already in transfer on another connection, so a
//! sender has at most one copy of each message on the wire.
//!
//! ## Inbound transfers
//!
//! A router remembers which ids are arriving on which connection. A second
//! offer of an id already in flight towards this host is refused as
//! [`ReceiveError::Duplicate`] before any eviction happens. The entry is
//! cleared when the transfer completes or its connection goes down. The first message the engine approves and the peer accepts
//! starts a transfer, and a connection never carries more than one.
//!
//! ## Capacity
//!
//! Buffered bytes never exceed capacity, with one exception: a locally
//! created message larger than the whole buffer is admitted if eviction
//! empties the buffer completely. Received messages larger than the buffer
//! are refused with [`ReceiveError::NoSpace`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use courier_core::{
    Connection, ConnectionId, HostAddress, HostInfo, Message, MessageId, MessageSnapshot,
    ReceiveError, SimEvent,
};

use crate::buffer::MessageBuffer;
use crate::engine::RoutingDecisionEngine;

/// Per-host message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Messages created here and admitted
    pub created: u64,
    /// Transfers started from here
    pub started: u64,
    /// Relayed messages stored here
    pub relayed: u64,
    /// Messages delivered here as final destination (first copies only)
    pub delivered: u64,
    /// Further copies of already delivered messages
    pub duplicate_deliveries: u64,
    /// Outbound transfers cut short by a lost contact
    pub aborted: u64,
    /// Messages lost to eviction, expiry, capacity or an explicit drop
    pub dropped: u64,
    /// Messages removed without counting as a drop
    pub removed: u64,
    /// Messages refused at admission
    pub rejected: u64,
}

/// What happened to a completed incoming transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// This host was the final destination
    Delivered { first: bool },
    /// Stored for further forwarding
    Stored,
    /// A copy arrived in the meantime over another connection
    Duplicate,
    /// No room left by the time the transfer finished
    Dropped,
}

/// Buffer and lifecycle manager for one host
#[derive(Debug)]
pub struct Router {
    host: HostAddress,
    buffer: MessageBuffer,
    engine: Box<dyn RoutingDecisionEngine>,
    /// Message being sent on each busy connection
    outbound: BTreeMap<ConnectionId, MessageId>,
    /// Message arriving on each busy connection
    inbound: BTreeMap<ConnectionId, MessageId>,
    /// Messages the peer refused on each connection; not offered again there
    refused: BTreeMap<ConnectionId, BTreeSet<MessageId>>,
    /// Ids delivered here as final destination
    delivered: BTreeSet<MessageId>,
    stats: RouterStats,
    events: Vec<SimEvent>,
}

impl Router {
    pub fn new(host: HostAddress, capacity: u64, engine: Box<dyn RoutingDecisionEngine>) -> Self {
        Self {
            host,
            buffer: MessageBuffer::new(capacity),
            engine,
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
            refused: BTreeMap::new(),
            delivered: BTreeSet::new(),
            stats: RouterStats::default(),
            events: Vec::new(),
        }
    }

    pub fn host(&self) -> HostAddress {
        self.host
    }

    pub fn engine(&self) -> &dyn RoutingDecisionEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn RoutingDecisionEngine {
        self.engine.as_mut()
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.buffer.capacity()
    }

    pub fn free_space(&self) -> u64 {
        self.buffer.free()
    }

    /// Buffer occupancy in percent
    pub fn occupancy(&self) -> f64 {
        self.buffer.occupancy()
    }

    pub fn message_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_message(&self, id: &MessageId) -> bool {
        self.buffer.contains(id)
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.buffer.get(id)
    }

    /// Buffered messages in arrival order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.buffer.iter()
    }

    pub fn is_delivered(&self, id: &MessageId) -> bool {
        self.delivered.contains(id)
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Message currently being sent on `connection`, if any
    pub fn outbound_on(&self, connection: ConnectionId) -> Option<&MessageId> {
        self.outbound.get(&connection)
    }

    /// Is `id` mid-transfer on any connection?
    pub fn is_sending(&self, id: &MessageId) -> bool {
        self.outbound.values().any(|m| m == id)
    }

    /// Is `id` arriving on any connection?
    pub fn is_receiving(&self, id: &MessageId) -> bool {
        self.inbound.values().any(|m| m == id)
    }

    /// A transfer of `id` towards this host started on `connection`
    pub fn incoming_started(&mut self, connection: ConnectionId, id: MessageId) {
        trace!(host = %self.host, connection = %connection, message = %id, "Incoming transfer");
        self.inbound.insert(connection, id);
    }

    /// Take the events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Admit a message created at this host
    ///
    /// # Errors
    ///
    /// `Duplicate` if the id is already known here, `Policy` if the engine
    /// refuses it, `NoSpace` if eviction cannot make room (counted as a drop).
    pub fn create_new_message(
        &mut self,
        mut message: Message,
        this: &HostInfo,
        now: f64,
    ) -> Result<(), ReceiveError> {
        debug_assert_eq!(message.from(), self.host, "message created at a foreign host");
        let id = message.id().clone();

        if self.buffer.contains(&id) || self.delivered.contains(&id) {
            return Err(self.reject(None, id, ReceiveError::Duplicate));
        }
        message.set_received_at(now);
        if !self.engine.new_message(&mut message) {
            return Err(self.reject(None, id, ReceiveError::Policy));
        }

        let size = message.size();
        if !self.make_room(size, this) {
            if size > self.buffer.capacity() && self.buffer.is_empty() {
                warn!(
                    host = %self.host,
                    message = %id,
                    size,
                    capacity = self.buffer.capacity(),
                    "Admitting message larger than the buffer"
                );
            } else {
                self.stats.dropped += 1;
                return Err(self.reject(None, id, ReceiveError::NoSpace));
            }
        }

        debug!(host = %self.host, message = %id, to = %message.to(), size, "Message created");
        self.events.push(SimEvent::MessageCreated {
            host: self.host,
            message: MessageSnapshot::from(&message),
        });
        self.buffer.insert(message);
        self.stats.created += 1;
        Ok(())
    }

    /// Decide whether an incoming copy from `from` may start transferring
    ///
    /// On success the caller owns the accepted copy; it is stored (or
    /// delivered) by [`message_transferred`](Self::message_transferred) once
    /// the last byte arrives.
    pub fn receive_message(
        &mut self,
        message: &mut Message,
        from: HostAddress,
        this: &HostInfo,
        now: f64,
    ) -> Result<(), ReceiveError> {
        let id = message.id().clone();

        if self.buffer.contains(&id) || self.delivered.contains(&id) || self.is_receiving(&id) {
            return Err(self.reject(Some(from), id, ReceiveError::Duplicate));
        }
        if message.is_expired(now) {
            return Err(self.reject(Some(from), id, ReceiveError::Expired));
        }
        if self.engine.is_final_dest(message, self.host) {
            return Ok(());
        }
        if !self.engine.should_save_received_message(message, this) {
            return Err(self.reject(Some(from), id, ReceiveError::Policy));
        }
        let size = message.size();
        if size > self.buffer.capacity() || !self.make_room(size, this) {
            self.stats.dropped += 1;
            return Err(self.reject(Some(from), id, ReceiveError::NoSpace));
        }
        Ok(())
    }

    /// Store or deliver a copy whose transfer from `from` has completed
    pub fn message_transferred(
        &mut self,
        mut message: Message,
        from: HostAddress,
        this: &HostInfo,
        now: f64,
    ) -> TransferOutcome {
        let id = message.id().clone();
        self.inbound.retain(|_, arriving| *arriving != id);

        if self.engine.is_final_dest(&message, self.host) {
            let first = self.delivered.insert(id.clone());
            if first {
                self.stats.delivered += 1;
                debug!(
                    host = %self.host,
                    message = %id,
                    hops = message.hop_count(),
                    latency = now - message.created_at(),
                    "Message delivered"
                );
            } else {
                self.stats.duplicate_deliveries += 1;
                trace!(host = %self.host, message = %id, "Duplicate delivery");
            }
            self.events.push(SimEvent::MessageTransferred {
                from,
                to: self.host,
                message: MessageSnapshot::from(&message),
                final_delivery: true,
                first_delivery: first,
            });
            return TransferOutcome::Delivered { first };
        }

        if self.buffer.contains(&id) {
            trace!(host = %self.host, message = %id, "Copy already buffered");
            return TransferOutcome::Duplicate;
        }

        if !self.make_room(message.size(), this) {
            warn!(
                host = %self.host,
                message = %id,
                from = %from,
                "No room for completed transfer, dropping"
            );
            self.stats.dropped += 1;
            self.reject(Some(from), id, ReceiveError::NoSpace);
            return TransferOutcome::Dropped;
        }

        message.set_received_at(now);
        self.events.push(SimEvent::MessageTransferred {
            from,
            to: self.host,
            message: MessageSnapshot::from(&message),
            final_delivery: false,
            first_delivery: false,
        });
        self.buffer.insert(message);
        self.stats.relayed += 1;
        debug!(host = %self.host, message = %id, from = %from, "Message relayed");
        TransferOutcome::Stored
    }

    /// Start a transfer to `other` over `connection`, if anything qualifies
    ///
    /// `offer` hands a candidate to the peer, which either accepts it
    /// (returning the copy to put on the wire) or refuses it. Returns the id
    /// of the message now in transfer.
    pub fn request_deliverable_messages<F>(
        &mut self,
        connection: &mut Connection,
        this: &HostInfo,
        other: &HostInfo,
        now: f64,
        mut offer: F,
    ) -> Option<MessageId>
    where
        F: FnMut(&Message) -> Result<Message, ReceiveError>,
    {
        if !connection.is_up() || connection.is_transferring() {
            return None;
        }
        debug_assert!(!self.outbound.contains_key(&connection.id()));

        let (direct, rest): (Vec<&Message>, Vec<&Message>) =
            self.buffer.iter().partition(|m| m.to() == other.address);
        let candidates: Vec<MessageId> = direct
            .into_iter()
            .chain(rest)
            .map(|m| m.id().clone())
            .collect();

        for id in candidates {
            if self.is_sending(&id)
                || self
                    .refused
                    .get(&connection.id())
                    .is_some_and(|refused| refused.contains(&id))
            {
                continue;
            }
            let Some(message) = self.buffer.get(&id) else {
                continue;
            };
            if message.has_visited(other.address) || message.is_expired(now) {
                continue;
            }
            if !self.engine.should_send_message_to_host(message, other, this) {
                continue;
            }

            match offer(message) {
                Ok(wire) => {
                    connection.start_transfer(self.host, wire, now);
                    self.outbound.insert(connection.id(), id.clone());
                    self.stats.started += 1;
                    debug!(
                        host = %self.host,
                        peer = %other.address,
                        connection = %connection.id(),
                        message = %id,
                        "Transfer started"
                    );
                    self.events.push(SimEvent::TransferStarted {
                        connection: connection.id(),
                        from: self.host,
                        to: other.address,
                        message: id.clone(),
                    });
                    return Some(id);
                }
                Err(reason) => {
                    trace!(
                        host = %self.host,
                        peer = %other.address,
                        message = %id,
                        %reason,
                        "Offer refused"
                    );
                    self.refused
                        .entry(connection.id())
                        .or_default()
                        .insert(id);
                }
            }
        }
        None
    }

    /// The transfer of `id` to `other` over `connection` completed
    pub fn transfer_done(&mut self, connection: ConnectionId, id: &MessageId, other: HostAddress) {
        self.outbound.remove(&connection);
        self.message_sent(id, other);
    }

    /// A copy of `id` reached `other`; apply the post-send deletion gate
    pub fn message_sent(&mut self, id: &MessageId, other: HostAddress) {
        let Some(message) = self.buffer.get_mut(id) else {
            return;
        };
        if self.engine.should_delete_sent_message(message, other) {
            self.delete_message(id, false);
        }
    }

    /// The transfer of `id` to `peer` was cut short; the buffered copy stays
    pub fn message_aborted(
        &mut self,
        connection: ConnectionId,
        id: &MessageId,
        peer: HostAddress,
        bytes_remaining: u64,
    ) {
        self.outbound.remove(&connection);
        self.stats.aborted += 1;
        debug!(
            host = %self.host,
            peer = %peer,
            connection = %connection,
            message = %id,
            bytes_remaining,
            "Transfer aborted"
        );
        self.events.push(SimEvent::TransferAborted {
            connection,
            from: self.host,
            to: peer,
            message: id.clone(),
            bytes_remaining,
        });
    }

    /// Remove a message from the buffer
    ///
    /// `drop` selects whether the removal counts as a drop. Returns the
    /// removed message, or `None` if it was not buffered.
    pub fn delete_message(&mut self, id: &MessageId, drop: bool) -> Option<Message> {
        let message = self.buffer.remove(id)?;
        if drop {
            self.stats.dropped += 1;
        } else {
            self.stats.removed += 1;
        }
        debug!(host = %self.host, message = %id, dropped = drop, "Message deleted");
        self.events.push(SimEvent::MessageDeleted {
            host: self.host,
            message: id.clone(),
            dropped: drop,
        });
        Some(message)
    }

    pub fn connection_up(&mut self, this: &HostInfo, peer: &HostInfo, now: f64) {
        self.engine.connection_up(this, peer, now);
    }

    pub fn connection_down(
        &mut self,
        connection: ConnectionId,
        this: &HostInfo,
        peer: &HostInfo,
        now: f64,
    ) {
        self.outbound.remove(&connection);
        self.inbound.remove(&connection);
        self.refused.remove(&connection);
        self.engine.connection_down(this, peer, now);
    }

    /// Periodic maintenance: engine hook, then expiry
    pub fn update(&mut self, this: &HostInfo, now: f64) {
        self.engine.update(this, now);

        let expired: Vec<MessageId> = self
            .buffer
            .iter()
            .filter(|m| m.is_expired(now) && !self.is_sending(m.id()))
            .map(|m| m.id().clone())
            .collect();
        for id in expired {
            debug!(host = %self.host, message = %id, "Message expired");
            self.delete_message(&id, true);
        }
    }

    /// Evict until `size` bytes are free; returns whether they are
    fn make_room(&mut self, size: u64, this: &HostInfo) -> bool {
        if self.buffer.free() >= size {
            return true;
        }
        for id in self.buffer.eviction_order() {
            if self.buffer.free() >= size {
                break;
            }
            if self.is_sending(&id) {
                continue;
            }
            let evictable = self
                .buffer
                .get(&id)
                .is_some_and(|m| self.engine.should_delete_old_message(m, this.address));
            if evictable {
                self.delete_message(&id, true);
            }
        }
        self.buffer.free() >= size
    }

    fn reject(&mut self, from: Option<HostAddress>, id: MessageId, reason: ReceiveError) -> ReceiveError {
        self.stats.rejected += 1;
        trace!(host = %self.host, message = %id, %reason, "Message rejected");
        self.events.push(SimEvent::MessageRejected {
            host: self.host,
            from,
            message: id,
            reason,
        });
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epidemic::Epidemic;
    use crate::searching::{REGISTRY_KEY, SearchingAgent, SearchingAgentConfig};
    use courier_core::{InterfaceRef, RunContext};

    fn info(address: u32) -> HostInfo {
        HostInfo::new(HostAddress(address), &format!("n{address}"), "n", "stationary")
    }

    fn epidemic_router(address: u32, capacity: u64) -> Router {
        Router::new(HostAddress(address), capacity, Box::new(Epidemic::default()))
    }

    /// A router whose engine never allows eviction
    fn keeping_router(address: u32, capacity: u64) -> Router {
        let mut ctx = RunContext::new();
        let engine = SearchingAgent::new(
            SearchingAgentConfig::default(),
            ctx.discovery_registry(REGISTRY_KEY),
        );
        Router::new(HostAddress(address), capacity, Box::new(engine))
    }

    fn connection(x: u32, y: u32) -> Connection {
        Connection::new(
            ConnectionId(0),
            InterfaceRef::new(HostAddress(x), 0),
            InterfaceRef::new(HostAddress(y), 0),
            10.0,
            0.0,
        )
    }

    fn message(id: &str, from: u32, to: u32, size: u64) -> Message {
        Message::new(id, HostAddress(from), HostAddress(to), size, 0.0)
    }

    fn arrive(router: &mut Router, m: Message, from: u32, now: f64) -> Result<TransferOutcome, ReceiveError> {
        let this = info(router.host().0);
        let mut wire = m;
        router.receive_message(&mut wire, HostAddress(from), &this, now)?;
        wire.add_node_on_path(router.host());
        Ok(router.message_transferred(wire, HostAddress(from), &this, now))
    }

    #[test]
    fn test_create_then_delete_round_trip() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        router.create_new_message(message("M1", 0, 1, 40), &this, 0.0).unwrap();
        assert_eq!(router.free_space(), 60);

        let removed = router.delete_message(&MessageId::new("M1"), false).unwrap();
        assert_eq!(removed.size(), 40);
        assert_eq!(router.free_space(), 100);
        assert_eq!(router.message_count(), 0);
        assert_eq!(router.stats().removed, 1);
        assert_eq!(router.stats().dropped, 0);
    }

    #[test]
    fn test_duplicate_creation_is_rejected() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        router.create_new_message(message("M1", 0, 1, 10), &this, 0.0).unwrap();
        assert_eq!(
            router.create_new_message(message("M1", 0, 1, 10), &this, 1.0),
            Err(ReceiveError::Duplicate)
        );
    }

    #[test]
    fn test_no_space_when_eviction_is_refused() {
        let mut router = keeping_router(2, 100);

        assert_eq!(arrive(&mut router, message("M1", 0, 9, 60), 0, 1.0), Ok(TransferOutcome::Stored));
        assert_eq!(
            arrive(&mut router, message("M2", 1, 9, 60), 1, 2.0),
            Err(ReceiveError::NoSpace)
        );
        assert_eq!(router.stats().dropped, 1);
        assert!(router.has_message(&MessageId::new("M1")));
        assert!(router.occupancy() <= 100.0);
    }

    #[test]
    fn test_eviction_drops_oldest_received_first() {
        let mut router = epidemic_router(5, 100);
        arrive(&mut router, message("old", 0, 9, 40), 0, 1.0).unwrap();
        arrive(&mut router, message("mid", 0, 9, 40), 0, 2.0).unwrap();

        assert_eq!(arrive(&mut router, message("new", 0, 9, 40), 0, 3.0), Ok(TransferOutcome::Stored));
        assert!(!router.has_message(&MessageId::new("old")));
        assert!(router.has_message(&MessageId::new("mid")));
        assert_eq!(router.stats().dropped, 1);
    }

    #[test]
    fn test_oversized_local_message_is_force_admitted() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        router.create_new_message(message("small", 0, 1, 30), &this, 0.0).unwrap();
        router.create_new_message(message("huge", 0, 1, 150), &this, 1.0).unwrap();

        assert_eq!(router.message_count(), 1);
        assert_eq!(router.occupancy(), 150.0);

        // The next message evicts it and occupancy is back within bounds
        router.create_new_message(message("next", 0, 1, 50), &this, 2.0).unwrap();
        assert!(!router.has_message(&MessageId::new("huge")));
        assert_eq!(router.occupancy(), 50.0);
        assert_eq!(router.stats().dropped, 2);
    }

    #[test]
    fn test_oversized_message_needs_an_empty_buffer() {
        let mut router = keeping_router(0, 100);
        let this = info(0);
        router.create_new_message(message("small", 0, 1, 30), &this, 0.0).unwrap();
        assert_eq!(
            router.create_new_message(message("huge", 0, 1, 150), &this, 1.0),
            Err(ReceiveError::NoSpace)
        );
        assert_eq!(router.stats().dropped, 1);
    }

    #[test]
    fn test_oversized_received_message_is_refused() {
        let mut router = epidemic_router(1, 100);
        assert_eq!(
            arrive(&mut router, message("huge", 0, 9, 150), 0, 0.0),
            Err(ReceiveError::NoSpace)
        );
    }

    #[test]
    fn test_delivered_ids_are_remembered() {
        let mut router = epidemic_router(1, 100);
        assert_eq!(
            arrive(&mut router, message("M1", 0, 1, 10), 0, 1.0),
            Ok(TransferOutcome::Delivered { first: true })
        );
        assert_eq!(router.message_count(), 0);
        assert_eq!(
            arrive(&mut router, message("M1", 0, 1, 10), 2, 2.0),
            Err(ReceiveError::Duplicate)
        );
        assert_eq!(router.stats().delivered, 1);
    }

    #[test]
    fn test_expired_messages_are_refused_and_purged() {
        let mut router = epidemic_router(1, 100);
        let m = message("M1", 0, 9, 10).with_ttl(5.0);
        assert_eq!(arrive(&mut router, m.clone(), 0, 6.0), Err(ReceiveError::Expired));

        arrive(&mut router, m, 0, 1.0).unwrap();
        router.update(&info(1), 10.0);
        assert_eq!(router.message_count(), 0);
        assert_eq!(router.stats().dropped, 1);
    }

    #[test]
    fn test_one_transfer_per_connection() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        let peer = info(1);
        router.create_new_message(message("M1", 0, 7, 10), &this, 0.0).unwrap();
        router.create_new_message(message("M2", 0, 7, 10), &this, 0.0).unwrap();

        let mut conn = connection(0, 1);
        let started = router.request_deliverable_messages(&mut conn, &this, &peer, 0.0, |m| Ok(m.replicate()));
        assert_eq!(started, Some(MessageId::new("M1")));

        let again = router.request_deliverable_messages(&mut conn, &this, &peer, 0.0, |m| Ok(m.replicate()));
        assert_eq!(again, None);
        assert_eq!(router.outbound_on(conn.id()), Some(&MessageId::new("M1")));
    }

    #[test]
    fn test_messages_for_the_peer_go_first() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        let peer = info(1);
        router.create_new_message(message("other", 0, 7, 10), &this, 0.0).unwrap();
        router.create_new_message(message("direct", 0, 1, 10), &this, 0.0).unwrap();

        let mut conn = connection(0, 1);
        let started = router.request_deliverable_messages(&mut conn, &this, &peer, 0.0, |m| Ok(m.replicate()));
        assert_eq!(started, Some(MessageId::new("direct")));
    }

    #[test]
    fn test_refused_offers_are_not_repeated_on_the_same_contact() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        let peer = info(1);
        router.create_new_message(message("M1", 0, 7, 10), &this, 0.0).unwrap();

        let mut conn = connection(0, 1);
        let mut offers = 0;
        for _ in 0..3 {
            router.request_deliverable_messages(&mut conn, &this, &peer, 0.0, |_| {
                offers += 1;
                Err(ReceiveError::Duplicate)
            });
        }
        assert_eq!(offers, 1);

        router.connection_down(conn.id(), &this, &peer, 1.0);
        let mut fresh = connection(0, 1);
        let retried = router.request_deliverable_messages(&mut fresh, &this, &peer, 1.0, |m| Ok(m.replicate()));
        assert!(retried.is_some());
    }

    #[test]
    fn test_message_in_flight_is_not_offered_on_another_connection() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        router.create_new_message(message("M1", 0, 9, 40), &this, 0.0).unwrap();

        let mut to_one = connection(0, 1);
        let mut to_two = Connection::new(
            ConnectionId(1),
            InterfaceRef::new(HostAddress(0), 0),
            InterfaceRef::new(HostAddress(2), 0),
            10.0,
            0.0,
        );
        let first = router.request_deliverable_messages(&mut to_one, &this, &info(1), 1.0, |m| Ok(m.replicate()));
        assert_eq!(first, Some(MessageId::new("M1")));

        let mut offers = 0;
        let second = router.request_deliverable_messages(&mut to_two, &this, &info(2), 1.0, |m| {
            offers += 1;
            Ok(m.replicate())
        });
        assert_eq!(second, None);
        assert_eq!(offers, 0);
        assert!(!to_two.is_transferring());

        // Free again once the first transfer is over
        router.transfer_done(to_one.id(), &MessageId::new("M1"), HostAddress(1));
        let retry = router.request_deliverable_messages(&mut to_two, &this, &info(2), 2.0, |m| Ok(m.replicate()));
        assert_eq!(retry, Some(MessageId::new("M1")));
    }

    #[test]
    fn test_second_offer_of_an_arriving_id_is_a_duplicate() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        arrive(&mut router, message("old", 5, 9, 60), 5, 0.0).unwrap();

        let mut first = message("M1", 1, 9, 40);
        assert_eq!(router.receive_message(&mut first, HostAddress(1), &this, 1.0), Ok(()));
        router.incoming_started(ConnectionId(0), MessageId::new("M1"));
        assert!(router.is_receiving(&MessageId::new("M1")));
        let dropped_after_first = router.stats().dropped;

        let mut second = message("M1", 1, 9, 40);
        assert_eq!(
            router.receive_message(&mut second, HostAddress(2), &this, 1.0),
            Err(ReceiveError::Duplicate)
        );
        // Refused before eviction
        assert_eq!(router.stats().dropped, dropped_after_first);

        first.add_node_on_path(HostAddress(0));
        assert_eq!(router.message_transferred(first, HostAddress(1), &this, 5.0), TransferOutcome::Stored);
        assert!(!router.is_receiving(&MessageId::new("M1")));
    }

    #[test]
    fn test_connection_down_clears_inbound() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        let mut m = message("M1", 1, 9, 40);
        router.receive_message(&mut m, HostAddress(1), &this, 1.0).unwrap();
        router.incoming_started(ConnectionId(3), MessageId::new("M1"));

        router.connection_down(ConnectionId(3), &this, &info(1), 2.0);
        assert!(!router.is_receiving(&MessageId::new("M1")));
        let mut again = message("M1", 1, 9, 40);
        assert_eq!(router.receive_message(&mut again, HostAddress(2), &this, 3.0), Ok(()));
    }

    #[test]
    fn test_sender_purges_after_final_delivery() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        router.create_new_message(message("M1", 0, 1, 10), &this, 0.0).unwrap();

        let mut conn = connection(0, 1);
        let id = router
            .request_deliverable_messages(&mut conn, &this, &info(1), 0.0, |m| Ok(m.replicate()))
            .unwrap();
        assert!(conn.advance(1.0).is_some());
        router.transfer_done(conn.id(), &id, HostAddress(1));

        assert!(!router.has_message(&id));
        assert!(router.outbound_on(conn.id()).is_none());
    }

    #[test]
    fn test_abort_keeps_sender_copy() {
        let mut router = epidemic_router(0, 100);
        let this = info(0);
        router.create_new_message(message("M1", 0, 1, 40), &this, 0.0).unwrap();

        let mut conn = connection(0, 1);
        let id = router
            .request_deliverable_messages(&mut conn, &this, &info(1), 0.0, |m| Ok(m.replicate()))
            .unwrap();
        conn.advance(1.0);
        let aborted = conn.tear_down(1.0).unwrap();
        router.message_aborted(conn.id(), &id, HostAddress(1), aborted.bytes_remaining);

        assert!(router.has_message(&id));
        assert_eq!(router.stats().aborted, 1);
        assert!(matches!(
            router.drain_events().last(),
            Some(SimEvent::TransferAborted { bytes_remaining: 30, .. })
        ));
    }
}
