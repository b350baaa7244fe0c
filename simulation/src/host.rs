//! Hosts: mobile nodes that carry a router and one or more radios
//!
//! A host owns its router, its interfaces and a cursor into its mobility
//! model's current path. Connections are not stored on the host; they are
//! derived from the interfaces. Every message operation is a straight
//! delegation to the router; the host adds no policy of its own, except
//! appending itself to the path of a message it accepts.

use std::sync::Arc;

use tracing::trace;

use courier_core::{
    Connection, ConnectionId, Coord, CourierError, HostAddress, HostError, HostInfo,
    InterfaceSpec, Message, MessageId, NetworkInterface, ReceiveError, RunContext,
};
use courier_routing::{Router, RoutingDecisionEngine, TransferOutcome};

use crate::mobility::{MobilityModel, Path};

/// A node in the simulated network
#[derive(Debug)]
pub struct Host {
    info: HostInfo,
    location: Coord,
    destination: Option<Coord>,
    speed: f64,
    next_time_to_move: f64,
    path: Option<Path>,
    mobility: Box<dyn MobilityModel>,
    router: Router,
    interfaces: Vec<NetworkInterface>,
}

impl Host {
    /// Create a host, taking the next address from the run context
    ///
    /// The decision engine is a replica of `engine_prototype`; interfaces
    /// are replicated from `interfaces` in order.
    pub fn new(
        ctx: &mut RunContext,
        group: &str,
        interfaces: &[InterfaceSpec],
        mut mobility: Box<dyn MobilityModel>,
        buffer_capacity: u64,
        engine_prototype: &dyn RoutingDecisionEngine,
    ) -> Self {
        let address = ctx.next_address();
        let name = format!("{group}{address}");
        let info = HostInfo::new(address, &name, group, mobility.kind());
        let location = mobility.initial_location();

        Self {
            info,
            location,
            destination: None,
            speed: 0.0,
            next_time_to_move: 0.0,
            path: None,
            mobility,
            router: Router::new(address, buffer_capacity, engine_prototype.replicate()),
            interfaces: interfaces
                .iter()
                .enumerate()
                .map(|(index, spec)| NetworkInterface::replicate(spec, address, index))
                .collect(),
        }
    }

    pub fn address(&self) -> HostAddress {
        self.info.address
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.info.name = Arc::from(name);
    }

    pub fn group(&self) -> &str {
        &self.info.group
    }

    /// Descriptor handed to decision engines
    pub fn info(&self) -> &HostInfo {
        &self.info
    }

    pub fn location(&self) -> Coord {
        self.location
    }

    /// Teleport the host; the current leg of its path is kept
    pub fn set_location(&mut self, location: Coord) {
        self.location = location;
    }

    pub fn destination(&self) -> Option<Coord> {
        self.destination
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn mobility(&self) -> &dyn MobilityModel {
        self.mobility.as_ref()
    }

    /// Whether the host's movement and radios are active at `now`
    pub fn is_active(&self, now: f64) -> bool {
        self.mobility.is_active(now)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn interfaces(&self) -> &[NetworkInterface] {
        &self.interfaces
    }

    /// First interface of the given type
    pub fn interface(&self, interface_type: &str) -> Result<&NetworkInterface, HostError> {
        self.interfaces
            .iter()
            .find(|i| i.interface_type() == interface_type)
            .ok_or_else(|| HostError::NoSuchInterface {
                host: self.address(),
                interface: interface_type.to_string(),
            })
    }

    pub fn interface_at(&self, index: usize) -> Option<&NetworkInterface> {
        self.interfaces.get(index)
    }

    pub fn interface_at_mut(&mut self, index: usize) -> Option<&mut NetworkInterface> {
        self.interfaces.get_mut(index)
    }

    /// Ids of every connection open on any interface, ascending
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .interfaces
            .iter()
            .flat_map(|i| i.connections())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn buffer_occupancy(&self) -> f64 {
        self.router.occupancy()
    }

    pub fn message_count(&self) -> usize {
        self.router.message_count()
    }

    /// Move for `dt` seconds of simulated time ending at `now`
    ///
    /// Nothing happens while the mobility model is inactive or before the
    /// host's next move time. Movement that overshoots a waypoint carries on
    /// towards the following ones within the same tick. When the path runs
    /// out the host stops and idles until the model's next-available time.
    pub fn move_by(&mut self, dt: f64, now: f64) {
        if !self.mobility.is_active(now) || now < self.next_time_to_move {
            return;
        }
        let mut destination = match self.destination {
            Some(d) => d,
            None => match self.next_waypoint(now) {
                Some(d) => d,
                None => return,
            },
        };

        let mut possible = dt * self.speed;
        let mut distance = self.location.distance(&destination);
        while possible >= distance {
            self.location = destination;
            possible -= distance;
            destination = match self.next_waypoint(now) {
                Some(d) => d,
                None => return,
            };
            distance = self.location.distance(&destination);
        }

        let ratio = possible / distance;
        self.location.translate(
            ratio * (destination.x - self.location.x),
            ratio * (destination.y - self.location.y),
        );
    }

    /// Advance to the next waypoint, fetching a path if there is none
    ///
    /// An exhausted path is not replaced straight away: the host idles until
    /// the model's next-available time, then fetches a new one.
    fn next_waypoint(&mut self, now: f64) -> Option<Coord> {
        if self.path.is_none() {
            self.path = self.mobility.path(now);
        }
        match self.path.as_mut().and_then(Path::next_waypoint) {
            Some(waypoint) => {
                self.speed = self.path.as_ref().map_or(0.0, Path::speed);
                self.destination = Some(waypoint);
                Some(waypoint)
            }
            None => {
                self.path = None;
                self.destination = None;
                self.next_time_to_move = self.mobility.next_path_available(now);
                trace!(host = %self.address(), until = self.next_time_to_move, "Idle");
                None
            }
        }
    }

    /// Accept (or refuse) a copy of `message` offered by `from`
    ///
    /// The copy has this host appended to its path before the router sees
    /// it, so the decision engine observes the path it would be stored with.
    pub fn receive_message(
        &mut self,
        message: &Message,
        from: HostAddress,
        now: f64,
    ) -> Result<Message, ReceiveError> {
        // A refused copy is discarded along with its path entry
        let mut wire = message.replicate();
        wire.add_node_on_path(self.address());
        self.router.receive_message(&mut wire, from, &self.info, now)?;
        Ok(wire)
    }

    pub fn create_new_message(&mut self, message: Message, now: f64) -> Result<(), ReceiveError> {
        self.router.create_new_message(message, &self.info, now)
    }

    pub fn delete_message(&mut self, id: &MessageId, drop: bool) -> Option<Message> {
        self.router.delete_message(id, drop)
    }

    pub fn message_transferred(&mut self, message: Message, from: HostAddress, now: f64) -> TransferOutcome {
        self.router.message_transferred(message, from, &self.info, now)
    }

    pub fn transfer_done(&mut self, connection: ConnectionId, id: &MessageId, other: HostAddress) {
        self.router.transfer_done(connection, id, other);
    }

    pub fn message_aborted(
        &mut self,
        connection: ConnectionId,
        id: &MessageId,
        peer: HostAddress,
        bytes_remaining: u64,
    ) {
        self.router.message_aborted(connection, id, peer, bytes_remaining);
    }

    /// Offer buffered messages to `other` over `connection`
    pub fn request_deliverable_messages(
        &mut self,
        connection: &mut Connection,
        other: &mut Host,
        now: f64,
    ) -> Option<MessageId> {
        let other_info = other.info.clone();
        let this = self.info.address;
        let connection_id = connection.id();
        let started = self
            .router
            .request_deliverable_messages(connection, &self.info, &other_info, now, |m| {
                other.receive_message(m, this, now)
            });
        if let Some(id) = &started {
            other.router.incoming_started(connection_id, id.clone());
        }
        started
    }

    /// Hand a buffered message to `to` instantly, outside any connection
    pub fn send_message(
        &mut self,
        id: &MessageId,
        to: &mut Host,
        now: f64,
    ) -> Result<TransferOutcome, CourierError> {
        let message = self
            .router
            .message(id)
            .ok_or_else(|| HostError::NoSuchMessage {
                host: self.address(),
                message: id.clone(),
            })?;
        let wire = to.receive_message(message, self.address(), now)?;
        let outcome = to.message_transferred(wire, self.address(), now);
        self.router.message_sent(id, to.address());
        Ok(outcome)
    }

    pub fn connection_up(&mut self, peer: &HostInfo, now: f64) {
        self.router.connection_up(&self.info, peer, now);
    }

    pub fn connection_down(&mut self, connection: ConnectionId, peer: &HostInfo, now: f64) {
        self.router.connection_down(connection, &self.info, peer, now);
    }

    /// Let this host's engine exchange state with `peer`'s for a new connection
    pub fn exchange_for_new_connection(&mut self, connection: &Connection, peer: &mut Host, now: f64) {
        self.router.engine_mut().do_exchange_for_new_connection(
            connection,
            &self.info,
            &peer.info,
            peer.router.engine_mut(),
            now,
        );
    }

    /// Periodic router maintenance
    pub fn update(&mut self, now: f64) {
        self.router.update(&self.info, now);
    }
}

/// Mutable access to two distinct hosts of an address-indexed table
pub(crate) fn pair_mut(hosts: &mut [Host], a: HostAddress, b: HostAddress) -> (&mut Host, &mut Host) {
    let (a, b) = (a.index(), b.index());
    assert_ne!(a, b, "pair_mut on a single host");
    if a < b {
        let (left, right) = hosts.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = hosts.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
