//! The world: hosts, connections and the tick scheduler
//!
//! The world owns every host (indexed by address), the table of live
//! connections, the run context and the event bus. It is single-threaded and
//! deterministic: given the same hosts, mobility seeds and messages, two runs
//! publish identical event sequences.
//!
//! ## Tick order
//!
//! Each [`World::step`] advances the clock by the update interval and then:
//!
//! 1. **Generate**: messages due from the generator are created at their
//!    source hosts
//! 2. **Transfer**: every live connection, by ascending id, credits the
//!    tick's bytes to its transfer; a finished transfer is handed to the
//!    receiver (`message_transferred`) and then the sender (`transfer_done`)
//! 3. **Move**: hosts move by ascending address
//! 4. **Contacts** (when contact simulation is on): connections whose
//!    endpoints left range or went inactive are torn down by ascending id,
//!    aborting any transfer; then new in-range interface pairs are opened,
//!    scanning hosts by ascending address. On a new connection both hosts
//!    get `connection_up` (lower address first) and the lower address runs
//!    the engine exchange
//! 5. **Route**: hosts by ascending address run their router update and
//!    then offer messages on each of their connections by ascending id, so
//!    the lower address gets the first chance on a shared idle connection
//!
//! Router events are published right after the interaction that produced
//! them, stamped with the current time.

use tracing::{debug, info, trace};

use courier_core::{
    AbortedTransfer, ConfigError, Connection, ConnectionId, ConnectionTable, CourierResult,
    EventListener, HostAddress, HostError, InterfaceRef, InterfaceSpec, Message, MessageId,
    NetworkInterface, RunContext, SimClock, SimEvent, TimedEvent, Transfer,
};
use courier_routing::{RoutingDecisionEngine, TransferOutcome};

use crate::generator::MessageGenerator;
use crate::grid::ConnectivityGrid;
use crate::host::{Host, pair_mut};
use crate::mobility::MobilityModel;
use crate::report::EventBus;
use crate::snapshot::{HostSnapshot, WorldSnapshot};

/// Scheduler settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Seconds of simulated time per tick
    pub update_interval: f64,
    /// `run` stops once the clock reaches this time
    pub end_time: f64,
    /// Detect contacts from host positions each tick
    pub simulate_connections: bool,
    /// Cell size of the contact-detection grid; `None` scans all pairs
    pub grid_cell_size: Option<f64>,
    /// Keep every published event in memory
    pub record_events: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            update_interval: 1.0,
            end_time: 100.0,
            simulate_connections: true,
            grid_cell_size: None,
            record_events: true,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.update_interval.is_finite() && self.update_interval > 0.0) {
            return Err(ConfigError::invalid_value("update_interval", "must be positive"));
        }
        if !(self.end_time.is_finite() && self.end_time >= 0.0) {
            return Err(ConfigError::invalid_value("end_time", "must be non-negative"));
        }
        if let Some(cell) = self.grid_cell_size {
            if !(cell.is_finite() && cell > 0.0) {
                return Err(ConfigError::invalid_value("connectivity_grid", "cell size must be positive"));
            }
        }
        Ok(())
    }
}

/// A running simulation
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    clock: SimClock,
    context: RunContext,
    hosts: Vec<Host>,
    connections: ConnectionTable,
    grid: Option<ConnectivityGrid>,
    generator: Option<MessageGenerator>,
    bus: EventBus,
    stopped: bool,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            grid: config.grid_cell_size.map(ConnectivityGrid::new),
            bus: EventBus::new(config.record_events),
            config,
            clock: SimClock::new(),
            context: RunContext::new(),
            hosts: Vec::new(),
            connections: ConnectionTable::new(),
            generator: None,
            stopped: false,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Run context, for building engine prototypes that share run state
    pub fn context_mut(&mut self) -> &mut RunContext {
        &mut self.context
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, address: HostAddress) -> Option<&Host> {
        self.hosts.get(address.index())
    }

    pub fn host_mut(&mut self, address: HostAddress) -> Option<&mut Host> {
        self.hosts.get_mut(address.index())
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Events kept so far (empty unless recording is on)
    pub fn events(&self) -> &[TimedEvent] {
        self.bus.log()
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.bus.add_listener(listener);
    }

    /// Install a message generator; its host ranges must fit the hosts spawned so far
    pub fn set_generator(&mut self, generator: MessageGenerator) -> Result<(), ConfigError> {
        generator.config().validate(self.hosts.len())?;
        self.generator = Some(generator);
        Ok(())
    }

    /// Add a host; its address is the next one from the run context
    pub fn spawn_host(
        &mut self,
        group: &str,
        interfaces: &[InterfaceSpec],
        mobility: Box<dyn MobilityModel>,
        buffer_capacity: u64,
        engine_prototype: &dyn RoutingDecisionEngine,
    ) -> HostAddress {
        let host = Host::new(
            &mut self.context,
            group,
            interfaces,
            mobility,
            buffer_capacity,
            engine_prototype,
        );
        let address = host.address();
        debug_assert_eq!(address.index(), self.hosts.len(), "addresses must be dense");

        // Keep grid cells at least as large as the longest range
        if let Some(grid) = &mut self.grid {
            let longest = interfaces.iter().map(|i| i.range).fold(0.0, f64::max);
            if longest > grid.cell_size() {
                debug!(old = grid.cell_size(), new = longest, "Growing connectivity grid cells");
                *grid = ConnectivityGrid::new(longest);
            }
        }

        debug!(host = %address, name = host.name(), location = ?host.location(), "Host spawned");
        self.hosts.push(host);
        address
    }

    fn host_or_err(&self, address: HostAddress) -> Result<&Host, HostError> {
        self.host(address).ok_or(HostError::NoSuchHost(address))
    }

    // ------------------------------------------------------------------
    // Administrative operations
    // ------------------------------------------------------------------

    /// Create a message at its source host
    pub fn create_message(&mut self, message: Message) -> CourierResult<()> {
        let from = message.from();
        self.host_or_err(from)?;
        self.host_or_err(message.to())?;
        let now = self.time();
        let result = self.hosts[from.index()].create_new_message(message, now);
        self.flush(from);
        Ok(result?)
    }

    /// Remove a buffered message; `drop` selects whether it counts as a drop
    pub fn delete_message(
        &mut self,
        host: HostAddress,
        id: &MessageId,
        drop: bool,
    ) -> Result<Message, HostError> {
        self.host_or_err(host)?;
        let removed = self.hosts[host.index()].delete_message(id, drop);
        self.flush(host);
        removed.ok_or_else(|| HostError::NoSuchMessage {
            host,
            message: id.clone(),
        })
    }

    /// Hand a copy of a buffered message from one host to another instantly
    pub fn send_message(
        &mut self,
        from: HostAddress,
        to: HostAddress,
        id: &MessageId,
    ) -> CourierResult<TransferOutcome> {
        self.host_or_err(from)?;
        self.host_or_err(to)?;
        if from == to {
            return Err(HostError::SelfConnection(from).into());
        }
        let now = self.time();
        let (sender, receiver) = pair_mut(&mut self.hosts, from, to);
        let outcome = sender.send_message(id, receiver, now);
        self.flush(to);
        self.flush(from);
        outcome
    }

    /// Open (`up`) or close a connection between two hosts by hand
    ///
    /// With no interface type given, each host's first interface is used and
    /// the two must share a type. Opening an already open pair and closing a
    /// missing one are no-ops. With contact simulation on, forced
    /// connections are still torn down once the hosts are out of range.
    pub fn force_connection(
        &mut self,
        a: HostAddress,
        b: HostAddress,
        interface_type: Option<&str>,
        up: bool,
    ) -> Result<(), HostError> {
        let host_a = self.host_or_err(a)?;
        let host_b = self.host_or_err(b)?;
        if a == b {
            return Err(HostError::SelfConnection(a));
        }

        let (x, y) = match interface_type {
            Some(t) => (host_a.interface(t)?, host_b.interface(t)?),
            None => {
                let (x, y) = (first_interface(host_a)?, first_interface(host_b)?);
                if x.interface_type() != y.interface_type() {
                    return Err(HostError::InterfaceMismatch {
                        a: x.interface_type().to_string(),
                        b: y.interface_type().to_string(),
                    });
                }
                (x, y)
            }
        };
        let (x, y) = (x.interface_ref(), y.interface_ref());

        let now = self.time();
        match (self.connections.find(x, y), up) {
            (None, true) => {
                self.open_connection(x, y, now);
            }
            (Some(id), false) => self.close_connection(id, now),
            _ => trace!(a = %a, b = %b, up, "Forced connection already in requested state"),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Advance one tick
    pub fn step(&mut self) -> CourierResult<()> {
        let dt = self.config.update_interval;
        let now = self.clock.advance(dt)?;
        trace!(time = now, "Tick");

        self.generate_messages(now);
        self.advance_transfers(dt, now);
        for host in &mut self.hosts {
            host.move_by(dt, now);
        }
        if self.config.simulate_connections {
            self.update_contacts(now);
        }
        self.route(now);
        Ok(())
    }

    /// Run until the end time or an explicit stop, then notify listeners
    pub fn run(&mut self) -> CourierResult<()> {
        info!(
            hosts = self.hosts.len(),
            end_time = self.config.end_time,
            interval = self.config.update_interval,
            "Simulation started"
        );
        // Half a tick of slack absorbs accumulated rounding in the clock
        let slack = self.config.update_interval / 2.0;
        while !self.stopped && self.time() + self.config.update_interval <= self.config.end_time + slack {
            self.step()?;
        }
        self.finish();
        info!(
            time = self.time(),
            connections = self.connections.len(),
            events = self.events().len(),
            "Simulation complete"
        );
        Ok(())
    }

    /// Advance exactly `ticks` ticks, ignoring the end time
    pub fn run_ticks(&mut self, ticks: u64) -> CourierResult<()> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Make `run` return after the current tick
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Tell listeners the run has ended
    pub fn finish(&mut self) {
        self.bus.done(self.time());
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            time: self.time(),
            hosts: self.hosts.iter().map(HostSnapshot::from).collect(),
            connections: self.connections.iter().map(Connection::snapshot).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Tick phases
    // ------------------------------------------------------------------

    fn generate_messages(&mut self, now: f64) {
        let Some(generator) = &mut self.generator else {
            return;
        };
        for message in generator.due(now) {
            let id = message.id().clone();
            if let Err(e) = self.create_message(message) {
                debug!(message = %id, error = %e, "Generated message not created");
            }
        }
    }

    fn advance_transfers(&mut self, dt: f64, now: f64) {
        for id in self.connections.ids() {
            let Some(transfer) = self.connections.get_mut(id).and_then(|c| c.advance(dt)) else {
                continue;
            };
            let Transfer {
                message, from, to, started_at, ..
            } = transfer;
            let message_id = message.id().clone();
            debug!(
                connection = %id,
                from = %from,
                to = %to,
                message = %message_id,
                elapsed = now - started_at,
                "Transfer complete"
            );

            let (sender, receiver) = pair_mut(&mut self.hosts, from, to);
            receiver.message_transferred(message, from, now);
            sender.transfer_done(id, &message_id, to);
            self.flush(to);
            self.flush(from);
        }
    }

    fn update_contacts(&mut self, now: f64) {
        for id in self.connections.ids() {
            let keep = self
                .connections
                .get(id)
                .is_some_and(|c| self.in_contact(c.a(), c.b(), now));
            if !keep {
                self.close_connection(id, now);
            }
        }

        if let Some(grid) = &mut self.grid {
            grid.rebuild(
                self.hosts
                    .iter()
                    .filter(|h| h.is_active(now))
                    .map(|h| (h.address(), h.location())),
            );
        }

        let mut pending: Vec<(InterfaceRef, InterfaceRef)> = Vec::new();
        for host in self.hosts.iter().filter(|h| h.is_active(now)) {
            let candidates: Vec<HostAddress> = match &self.grid {
                Some(grid) => grid.candidates(host.location()),
                None => self.hosts.iter().map(Host::address).collect(),
            };
            for peer in candidates
                .into_iter()
                .filter(|&p| p > host.address())
                .filter_map(|p| self.host(p))
                .filter(|p| p.is_active(now))
            {
                for x in host.interfaces() {
                    for y in peer.interfaces() {
                        if x.can_connect(&host.location(), y, &peer.location())
                            && self.connections.find(x.interface_ref(), y.interface_ref()).is_none()
                        {
                            pending.push((x.interface_ref(), y.interface_ref()));
                        }
                    }
                }
            }
        }
        for (x, y) in pending {
            self.open_connection(x, y, now);
        }
    }

    fn route(&mut self, now: f64) {
        for index in 0..self.hosts.len() {
            let address = self.hosts[index].address();
            self.hosts[index].update(now);
            self.flush(address);

            for id in self.hosts[index].connection_ids() {
                let Some(connection) = self.connections.get_mut(id) else {
                    continue;
                };
                let other = connection.other_host(address);
                let (this, peer) = pair_mut(&mut self.hosts, address, other);
                if this.request_deliverable_messages(connection, peer, now).is_some() {
                    self.flush(address);
                }
                self.flush(other);
            }
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Both endpoints active and within range of each other
    fn in_contact(&self, x: InterfaceRef, y: InterfaceRef, now: f64) -> bool {
        let (Some(hx), Some(hy)) = (self.host(x.host), self.host(y.host)) else {
            return false;
        };
        let (Some(ix), Some(iy)) = (hx.interface_at(x.index), hy.interface_at(y.index)) else {
            return false;
        };
        hx.is_active(now) && hy.is_active(now) && ix.is_within_range(&hx.location(), iy, &hy.location())
    }

    fn open_connection(&mut self, x: InterfaceRef, y: InterfaceRef, now: f64) {
        let speed = match (
            self.host(x.host).and_then(|h| h.interface_at(x.index)),
            self.host(y.host).and_then(|h| h.interface_at(y.index)),
        ) {
            (Some(ix), Some(iy)) => ix.transmit_speed_with(iy),
            _ => return,
        };
        let id = self.context.next_connection_id();
        let connection = Connection::new(id, x, y, speed, now);
        let (a, b) = connection.hosts();
        let snapshot = connection.snapshot();
        if !self.connections.open(connection) {
            return;
        }
        for end in [x, y] {
            if let Some(interface) = self.hosts[end.host.index()].interface_at_mut(end.index) {
                interface.attach(id);
            }
        }

        debug!(connection = %id, a = %a, b = %b, speed, "Connection up");
        self.publish(now, SimEvent::ConnectionUp { connection: snapshot });

        let (low, high) = pair_mut(&mut self.hosts, a, b);
        let (low_info, high_info) = (low.info().clone(), high.info().clone());
        low.connection_up(&high_info, now);
        high.connection_up(&low_info, now);
        if let Some(connection) = self.connections.get(id) {
            low.exchange_for_new_connection(connection, high, now);
        }
        self.flush(a);
        self.flush(b);
    }

    fn close_connection(&mut self, id: ConnectionId, now: f64) {
        let Some(mut connection) = self.connections.close(id) else {
            return;
        };
        let aborted = connection.tear_down(now);
        let (a, b) = connection.hosts();

        if let Some(AbortedTransfer {
            transfer,
            bytes_remaining,
        }) = aborted
        {
            self.hosts[transfer.from.index()].message_aborted(
                id,
                transfer.message.id(),
                transfer.to,
                bytes_remaining,
            );
            self.flush(transfer.from);
        }
        for end in [connection.a(), connection.b()] {
            if let Some(interface) = self.hosts[end.host.index()].interface_at_mut(end.index) {
                interface.detach(id);
            }
        }

        debug!(connection = %id, a = %a, b = %b, "Connection down");
        self.publish(now, SimEvent::ConnectionDown {
            connection: connection.snapshot(),
        });

        let (ha, hb) = pair_mut(&mut self.hosts, a, b);
        let (info_a, info_b) = (ha.info().clone(), hb.info().clone());
        ha.connection_down(id, &info_b, now);
        hb.connection_down(id, &info_a, now);
        self.flush(a);
        self.flush(b);
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn publish(&mut self, time: f64, event: SimEvent) {
        self.bus.publish(TimedEvent { time, event });
    }

    /// Publish whatever the host's router has queued
    fn flush(&mut self, address: HostAddress) {
        let time = self.time();
        let Some(host) = self.hosts.get_mut(address.index()) else {
            return;
        };
        for event in host.router_mut().drain_events() {
            self.bus.publish(TimedEvent { time, event });
        }
    }
}

fn first_interface(host: &Host) -> Result<&NetworkInterface, HostError> {
    host.interface_at(0).ok_or_else(|| HostError::NoSuchInterface {
        host: host.address(),
        interface: "<any>".to_string(),
    })
}
