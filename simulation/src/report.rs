//! Reporting: event fan-out and summary listeners
//!
//! The world publishes every [`TimedEvent`] to an [`EventBus`], which keeps
//! an optional log and forwards the event to each registered
//! [`EventListener`]. Listeners only ever see events by shared reference.
//!
//! Summary listeners:
//! - [`MessageStatsReport`]: delivery ratio, latency, hop count, overhead
//! - [`ContactReport`]: contact counts and durations
//!
//! [`SearchCoverage`] is computed from the world rather than from events,
//! since discoveries live in the searching agents' shared registry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::trace;

use courier_core::{ConnectionId, EventListener, MessageId, SimEvent, TimedEvent};
use courier_routing::{SearchReporting, SearchingAgent};

use crate::world::World;

/// Fan-out of events to listeners, with an optional in-memory log
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
    log: Vec<TimedEvent>,
    record: bool,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("logged", &self.log.len())
            .field("record", &self.record)
            .finish()
    }
}

impl EventBus {
    pub fn new(record: bool) -> Self {
        Self {
            listeners: Vec::new(),
            log: Vec::new(),
            record,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn publish(&mut self, event: TimedEvent) {
        trace!(time = event.time, kind = event.event.kind(), "Event");
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
        if self.record {
            self.log.push(event);
        }
    }

    /// Tell every listener the run is over
    pub fn done(&mut self, end_time: f64) {
        for listener in &mut self.listeners {
            listener.done(end_time);
        }
    }

    pub fn log(&self) -> &[TimedEvent] {
        &self.log
    }
}

/// Records every event
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<TimedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Events of one kind, e.g. `"connection_up"`
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a TimedEvent> + 'a {
        self.events.iter().filter(move |e| e.event.kind() == kind)
    }

    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl EventListener for EventLog {
    fn on_event(&mut self, event: &TimedEvent) {
        self.events.push(event.clone());
    }
}

/// Message delivery statistics for a whole run
#[derive(Debug, Default, Clone, Serialize)]
pub struct MessageStatsReport {
    pub created: u64,
    pub started: u64,
    /// Completed transfers, deliveries included
    pub relayed: u64,
    pub aborted: u64,
    pub dropped: u64,
    pub removed: u64,
    pub rejected: u64,
    /// Distinct messages that reached their destination
    pub delivered: u64,
    latencies: Vec<f64>,
    hop_counts: Vec<usize>,
    #[serde(skip)]
    seen_delivered: BTreeSet<MessageId>,
}

impl MessageStatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivery_probability(&self) -> f64 {
        if self.created == 0 {
            0.0
        } else {
            self.delivered as f64 / self.created as f64
        }
    }

    /// Extra transfers per delivered message
    pub fn overhead_ratio(&self) -> Option<f64> {
        (self.delivered > 0).then(|| (self.relayed - self.delivered) as f64 / self.delivered as f64)
    }

    pub fn latency_avg(&self) -> Option<f64> {
        mean(self.latencies.iter().copied())
    }

    pub fn hop_count_avg(&self) -> Option<f64> {
        mean(self.hop_counts.iter().map(|&h| h as f64))
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    (n > 0).then(|| values.sum::<f64>() / n as f64)
}

impl EventListener for MessageStatsReport {
    fn on_event(&mut self, event: &TimedEvent) {
        match &event.event {
            SimEvent::MessageCreated { .. } => self.created += 1,
            SimEvent::TransferStarted { .. } => self.started += 1,
            SimEvent::TransferAborted { .. } => self.aborted += 1,
            SimEvent::MessageRejected { .. } => self.rejected += 1,
            SimEvent::MessageDeleted { dropped: true, .. } => self.dropped += 1,
            SimEvent::MessageDeleted { dropped: false, .. } => self.removed += 1,
            SimEvent::MessageTransferred {
                message,
                final_delivery,
                ..
            } => {
                self.relayed += 1;
                if *final_delivery && self.seen_delivered.insert(message.id.clone()) {
                    self.delivered += 1;
                    self.latencies.push(event.time - message.created_at);
                    self.hop_counts.push(message.hop_count);
                }
            }
            SimEvent::ConnectionUp { .. } | SimEvent::ConnectionDown { .. } => {}
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "NaN".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for MessageStatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "created: {}", self.created)?;
        writeln!(f, "started: {}", self.started)?;
        writeln!(f, "relayed: {}", self.relayed)?;
        writeln!(f, "aborted: {}", self.aborted)?;
        writeln!(f, "dropped: {}", self.dropped)?;
        writeln!(f, "removed: {}", self.removed)?;
        writeln!(f, "rejected: {}", self.rejected)?;
        writeln!(f, "delivered: {}", self.delivered)?;
        writeln!(f, "delivery_prob: {:.4}", self.delivery_probability())?;
        writeln!(f, "overhead_ratio: {}", fmt_opt(self.overhead_ratio()))?;
        writeln!(f, "latency_avg: {}", fmt_opt(self.latency_avg()))?;
        write!(f, "hopcount_avg: {}", fmt_opt(self.hop_count_avg()))
    }
}

/// Contact counts and durations
#[derive(Debug, Default, Clone, Serialize)]
pub struct ContactReport {
    pub ups: u64,
    pub downs: u64,
    /// Summed duration of finished contacts
    pub total_contact_time: f64,
    #[serde(skip)]
    open: BTreeMap<ConnectionId, f64>,
}

impl ContactReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contacts still up
    pub fn open_contacts(&self) -> usize {
        self.open.len()
    }

    pub fn mean_contact_time(&self) -> Option<f64> {
        let closed = self.downs as usize;
        (closed > 0).then(|| self.total_contact_time / closed as f64)
    }
}

impl EventListener for ContactReport {
    fn on_event(&mut self, event: &TimedEvent) {
        match &event.event {
            SimEvent::ConnectionUp { connection } => {
                self.ups += 1;
                self.open.insert(connection.id, event.time);
            }
            SimEvent::ConnectionDown { connection } => {
                self.downs += 1;
                if let Some(start) = self.open.remove(&connection.id) {
                    self.total_contact_time += event.time - start;
                }
            }
            _ => {}
        }
    }

    /// Contacts still up at the end count until `end_time`
    fn done(&mut self, end_time: f64) {
        for (_, start) in std::mem::take(&mut self.open) {
            self.downs += 1;
            self.total_contact_time += end_time - start;
        }
    }
}

impl fmt::Display for ContactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "contacts_up: {}", self.ups)?;
        writeln!(f, "contacts_down: {}", self.downs)?;
        writeln!(f, "total_contact_time: {:.2}", self.total_contact_time)?;
        write!(f, "mean_contact_time: {}", fmt_opt(self.mean_contact_time()))
    }
}

/// How much of the searchable population the agents have found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCoverage {
    pub sim_time: f64,
    pub agents: usize,
    pub initial_discovery: Option<f64>,
    pub searchable: usize,
    pub discovered: usize,
    pub remaining: usize,
    /// Percentage of searchable hosts discovered
    pub success_rate: f64,
    /// Discovery times, ascending
    pub discovery_times: Vec<f64>,
}

impl SearchCoverage {
    /// `None` unless the world runs searching agents and has searchable hosts
    pub fn from_world(world: &World) -> Option<Self> {
        let agents: Vec<&SearchingAgent> = world
            .hosts()
            .iter()
            .filter_map(|h| h.router().engine().as_any().downcast_ref::<SearchingAgent>())
            .collect();
        let representative = *agents.first()?;

        let searchable = world
            .hosts()
            .iter()
            .filter(|h| {
                representative.is_target(h.info())
                    && !h.router().engine().as_any().is::<SearchingAgent>()
            })
            .count();
        if searchable == 0 {
            return None;
        }

        let found = representative.discovered_nodes();
        let mut discovery_times: Vec<f64> = found.iter().map(|d| d.time).collect();
        discovery_times.sort_by(f64::total_cmp);
        let discovered = found.len();

        Some(Self {
            sim_time: world.time(),
            agents: agents.len(),
            initial_discovery: representative.initial_discovery(),
            searchable,
            discovered,
            remaining: searchable.saturating_sub(discovered),
            success_rate: discovered as f64 / searchable as f64 * 100.0,
            discovery_times,
        })
    }

    /// Cumulative discoveries sampled every `interval` seconds up to `sim_time`
    pub fn over_time(&self, interval: f64) -> Vec<(f64, usize)> {
        if interval <= 0.0 {
            return Vec::new();
        }
        let mut samples = Vec::new();
        let mut t = interval;
        while t <= self.sim_time {
            let count = self.discovery_times.partition_point(|&d| d <= t);
            samples.push((t, count));
            t += interval;
        }
        samples
    }
}

impl fmt::Display for SearchCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sim_time: {:.1}", self.sim_time)?;
        writeln!(f, "totalSearchingAgents: {}", self.agents)?;
        writeln!(f, "initialDiscoveryTime: {}", fmt_opt(self.initial_discovery))?;
        writeln!(f, "totalSearchableNodes: {}", self.searchable)?;
        writeln!(f, "totalDiscoveredNodes: {}", self.discovered)?;
        writeln!(f, "totalRemainingNodes: {}", self.remaining)?;
        write!(f, "totalSuccessRate: {:.2}%", self.success_rate)
    }
}
