//! PRoPHET (Probabilistic Routing Protocol using History of Encounters)
//!
//! PRoPHET uses encounter history to estimate delivery probabilities.
//! Nodes that are frequently encountered are more likely to be good
//! intermediaries for message delivery.
//!
//! Key concepts:
//! - **Delivery Probability (P)**: Likelihood that this node can deliver to a destination
//! - **Encounter Updates**: When two nodes meet, their probabilities increase
//! - **Transitivity**: If A knows B and B knows C, A can infer knowledge of C
//! - **Aging**: Probabilities decay with simulated time when encounters don't occur
//!
//! Tables are exchanged once, at the start of each contact, in
//! [`do_exchange_for_new_connection`](RoutingDecisionEngine::do_exchange_for_new_connection).
//! Each side keeps a copy of the peer's table for the lifetime of the contact
//! and forwards a message when the peer's probability for its destination is
//! higher than its own.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use courier_core::{ConfigError, Connection, HostAddress, HostInfo, Message, RunContext};

use crate::engine::RoutingDecisionEngine;
use crate::registry::parse_settings;

/// PRoPHET protocol configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProphetConfig {
    /// Initial probability upon first encounter (P_init)
    /// Default: 0.75 (high initial confidence)
    pub initial_probability: f64,

    /// Aging constant for probability decay (gamma)
    /// Applied once per elapsed time unit: P_new = P_old * gamma^k
    /// Default: 0.98 (slow decay)
    pub aging_constant: f64,

    /// Transitivity scaling factor (beta)
    /// P_a_c = P_a_b * P_b_c * beta
    /// Default: 0.25 (conservative transitivity)
    pub transitivity_constant: f64,

    /// Simulated seconds per aging step
    /// Default: 30
    pub seconds_in_time_unit: f64,

    /// Maximum probability value (capped)
    /// Default: 0.99
    pub max_probability: f64,

    /// Minimum probability before dropping from table
    /// Default: 0.01
    pub min_probability: f64,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        Self {
            initial_probability: 0.75,
            aging_constant: 0.98,
            transitivity_constant: 0.25,
            seconds_in_time_unit: 30.0,
            max_probability: 0.99,
            min_probability: 0.01,
        }
    }
}

impl ProphetConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let unit = |field: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::InvalidSettings {
                    name: Prophet::NAME.to_string(),
                    reason: format!("{field} must lie in [0, 1], got {v}"),
                })
            }
        };
        unit("initial_probability", self.initial_probability)?;
        unit("aging_constant", self.aging_constant)?;
        unit("transitivity_constant", self.transitivity_constant)?;
        unit("max_probability", self.max_probability)?;
        unit("min_probability", self.min_probability)?;
        if !self.seconds_in_time_unit.is_finite() || self.seconds_in_time_unit <= 0.0 {
            return Err(ConfigError::InvalidSettings {
                name: Prophet::NAME.to_string(),
                reason: "seconds_in_time_unit must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// PRoPHET routing state for one host
#[derive(Debug, Clone, Default)]
pub struct Prophet {
    config: ProphetConfig,
    /// Delivery probability for each destination
    probabilities: BTreeMap<HostAddress, f64>,
    /// Simulation time the table was last aged
    last_aging: f64,
    /// Tables received from currently connected peers
    peer_tables: BTreeMap<HostAddress, BTreeMap<HostAddress, f64>>,
}

impl Prophet {
    pub const NAME: &'static str = "prophet";

    pub fn new(config: ProphetConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn from_settings(
        settings: &Value,
        _ctx: &mut RunContext,
    ) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError> {
        let config: ProphetConfig = parse_settings(Self::NAME, settings)?;
        config.validate()?;
        Ok(Box::new(Self::new(config)))
    }

    pub fn config(&self) -> &ProphetConfig {
        &self.config
    }

    /// Get delivery probability for a destination
    ///
    /// Returns 0.0 if the destination is unknown.
    pub fn probability(&self, destination: HostAddress) -> f64 {
        self.probabilities.get(&destination).copied().unwrap_or(0.0)
    }

    /// All known destinations with their probabilities, in address order
    pub fn probabilities(&self) -> &BTreeMap<HostAddress, f64> {
        &self.probabilities
    }

    /// Probability a connected peer reported for `destination`
    pub fn peer_probability(&self, peer: HostAddress, destination: HostAddress) -> Option<f64> {
        self.peer_tables
            .get(&peer)
            .map(|table| table.get(&destination).copied().unwrap_or(0.0))
    }

    /// Record a direct encounter with a peer
    pub fn encounter(&mut self, local: HostAddress, peer: HostAddress) {
        if peer == local {
            return;
        }
        let p_new = match self.probabilities.get(&peer) {
            // P_new = P_old + (1 - P_old) * P_init
            Some(&p_old) => p_old + (1.0 - p_old) * self.config.initial_probability,
            None => self.config.initial_probability,
        };
        self.probabilities
            .insert(peer, p_new.min(self.config.max_probability));
    }

    /// Apply transitive probability updates learned from `intermediary`
    ///
    /// For each destination C that B knows:
    ///   P_a_c = P_a_c + (1 - P_a_c) * P_a_b * P_b_c * beta
    pub fn transitive_update(
        &mut self,
        local: HostAddress,
        intermediary: HostAddress,
        intermediary_probs: &BTreeMap<HostAddress, f64>,
    ) {
        let p_to_intermediary = self.probability(intermediary);
        if p_to_intermediary <= self.config.min_probability {
            return;
        }

        for (&destination, &p_int_to_dest) in intermediary_probs {
            if destination == local || destination == intermediary {
                continue;
            }
            let p_old = self.probability(destination);
            let transitive = p_to_intermediary * p_int_to_dest * self.config.transitivity_constant;
            let p_new = (p_old + (1.0 - p_old) * transitive).min(self.config.max_probability);
            if p_new > p_old {
                self.probabilities.insert(destination, p_new);
            }
        }
    }

    /// Decay every probability by the time units elapsed since the last aging
    pub fn age(&mut self, now: f64) {
        let elapsed = now - self.last_aging;
        if elapsed <= 0.0 {
            return;
        }
        let factor = self
            .config
            .aging_constant
            .powf(elapsed / self.config.seconds_in_time_unit);
        self.last_aging = now;

        let min = self.config.min_probability;
        self.probabilities.retain(|_, p| {
            *p *= factor;
            *p >= min
        });
    }

    pub fn known_destinations(&self) -> usize {
        self.probabilities.len()
    }
}

impl RoutingDecisionEngine for Prophet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn replicate(&self) -> Box<dyn RoutingDecisionEngine> {
        Box::new(Self::new(self.config.clone()))
    }

    fn connection_down(&mut self, _this: &HostInfo, peer: &HostInfo, _now: f64) {
        self.peer_tables.remove(&peer.address);
    }

    fn do_exchange_for_new_connection(
        &mut self,
        connection: &Connection,
        this: &HostInfo,
        peer: &HostInfo,
        peer_engine: &mut dyn RoutingDecisionEngine,
        now: f64,
    ) {
        let Some(other) = peer_engine.as_any_mut().downcast_mut::<Prophet>() else {
            debug!(
                connection = %connection.id(),
                peer = %peer.address,
                peer_engine = peer_engine.name(),
                "Peer is not running PRoPHET, skipping exchange"
            );
            return;
        };

        self.age(now);
        other.age(now);

        let ours_before = self.probabilities.clone();
        let theirs_before = other.probabilities.clone();

        self.encounter(this.address, peer.address);
        other.encounter(peer.address, this.address);
        self.transitive_update(this.address, peer.address, &theirs_before);
        other.transitive_update(peer.address, this.address, &ours_before);

        self.peer_tables
            .insert(peer.address, other.probabilities.clone());
        other
            .peer_tables
            .insert(this.address, self.probabilities.clone());

        trace!(
            host = %this.address,
            peer = %peer.address,
            known = self.known_destinations(),
            "Exchanged delivery predictabilities"
        );
    }

    fn new_message(&mut self, _message: &mut Message) -> bool {
        true
    }

    fn should_save_received_message(&mut self, _message: &mut Message, _this: &HostInfo) -> bool {
        true
    }

    fn should_send_message_to_host(
        &mut self,
        message: &Message,
        other: &HostInfo,
        _this: &HostInfo,
    ) -> bool {
        if message.to() == other.address {
            return true;
        }
        match self.peer_probability(other.address, message.to()) {
            Some(theirs) => theirs > self.probability(message.to()),
            None => false,
        }
    }

    fn should_delete_sent_message(&mut self, message: &mut Message, other: HostAddress) -> bool {
        message.to() == other
    }

    fn should_delete_old_message(&mut self, _message: &Message, _host_reporting_old: HostAddress) -> bool {
        true
    }

    fn update(&mut self, _this: &HostInfo, now: f64) {
        self.age(now);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ConnectionId, InterfaceRef};

    const A: HostAddress = HostAddress(0);
    const B: HostAddress = HostAddress(1);
    const C: HostAddress = HostAddress(2);

    fn info(address: HostAddress) -> HostInfo {
        HostInfo::new(address, &format!("p{address}"), "p", "stationary")
    }

    fn connection(x: HostAddress, y: HostAddress) -> Connection {
        Connection::new(
            ConnectionId(0),
            InterfaceRef::new(x, 0),
            InterfaceRef::new(y, 0),
            1.0,
            0.0,
        )
    }

    #[test]
    fn test_initial_encounter() {
        let mut state = Prophet::default();
        assert_eq!(state.probability(B), 0.0);

        state.encounter(A, B);
        assert!((state.probability(B) - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_repeated_encounters() {
        let mut state = Prophet::default();
        state.encounter(A, B);
        let p1 = state.probability(B);
        state.encounter(A, B);
        let p2 = state.probability(B);

        assert!(p2 > p1);
        assert!(p2 <= 0.99);
    }

    #[test]
    fn test_no_self_encounter() {
        let mut state = Prophet::default();
        state.encounter(A, A);
        assert_eq!(state.known_destinations(), 0);
    }

    #[test]
    fn test_transitive_update() {
        let mut a = Prophet::default();
        let mut b = Prophet::default();
        a.encounter(A, B);
        b.encounter(B, C);
        b.encounter(B, C);

        a.transitive_update(A, B, b.probabilities());
        assert!(a.probability(C) > 0.0);
        assert!(a.probability(C) < b.probability(C));
    }

    #[test]
    fn test_aging_decays_and_drops() {
        let mut state = Prophet::new(ProphetConfig {
            aging_constant: 0.5,
            seconds_in_time_unit: 10.0,
            ..Default::default()
        });
        state.encounter(A, B);

        state.age(10.0);
        assert!((state.probability(B) - 0.375).abs() < 1e-9);

        state.age(100.0);
        assert_eq!(state.known_destinations(), 0);
    }

    #[test]
    fn test_exchange_updates_both_sides() {
        let mut a = Prophet::default();
        let mut b = Prophet::default();
        b.encounter(B, C);

        a.do_exchange_for_new_connection(&connection(A, B), &info(A), &info(B), &mut b, 0.0);

        assert!(a.probability(B) > 0.0);
        assert!(b.probability(A) > 0.0);
        assert!(a.probability(C) > 0.0);

        // B is the better carrier towards C
        let m = Message::new("M1", A, C, 10, 0.0);
        assert!(a.should_send_message_to_host(&m, &info(B), &info(A)));
        assert!(!b.should_send_message_to_host(&m, &info(A), &info(B)));

        a.connection_down(&info(A), &info(B), 5.0);
        assert!(!a.should_send_message_to_host(&m, &info(B), &info(A)));
    }

    #[test]
    fn test_replicate_starts_empty() {
        let mut prototype = Prophet::default();
        prototype.encounter(A, B);
        let replica = prototype.replicate();
        let replica = replica.as_any().downcast_ref::<Prophet>().unwrap();
        assert_eq!(replica.known_destinations(), 0);
    }
}
