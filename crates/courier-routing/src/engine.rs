//! The routing decision engine contract
//!
//! A [`RoutingDecisionEngine`] is the pluggable forwarding policy that a
//! [`Router`](crate::Router) consults at every lifecycle gate. The router owns
//! the buffer and the mechanics (admission, eviction, transfers, deletion);
//! the engine only answers yes/no questions and keeps whatever per-host
//! state its algorithm needs.
//!
//! ## Instances
//!
//! Every host holds its own engine, produced by calling
//! [`replicate`](RoutingDecisionEngine::replicate) on one configured
//! prototype. `replicate` deep-copies settings and per-host state; the only
//! state replicas may share is an explicit run-scoped object obtained from
//! [`RunContext`](courier_core::RunContext) (for example a
//! [`DiscoveryRegistry`](courier_core::DiscoveryRegistry)).
//!
//! ## Gate order
//!
//! 1. Admission: [`new_message`](RoutingDecisionEngine::new_message) for
//!    local messages, [`should_save_received_message`](RoutingDecisionEngine::should_save_received_message)
//!    for relayed ones
//! 2. Eviction: [`should_delete_old_message`](RoutingDecisionEngine::should_delete_old_message)
//! 3. Forwarding: [`should_send_message_to_host`](RoutingDecisionEngine::should_send_message_to_host)
//! 4. Post-transfer: [`is_final_dest`](RoutingDecisionEngine::is_final_dest) at
//!    the receiver, [`should_delete_sent_message`](RoutingDecisionEngine::should_delete_sent_message)
//!    at the sender

use std::any::Any;
use std::fmt::Debug;

use courier_core::{Connection, HostAddress, HostInfo, Message};

/// Forwarding policy consulted by a router
pub trait RoutingDecisionEngine: Debug {
    /// Registry name of the strategy
    fn name(&self) -> &'static str;

    /// Fresh instance for a new host
    fn replicate(&self) -> Box<dyn RoutingDecisionEngine>;

    /// A connection to `peer` came up
    fn connection_up(&mut self, _this: &HostInfo, _peer: &HostInfo, _now: f64) {}

    /// The connection to `peer` went down
    fn connection_down(&mut self, _this: &HostInfo, _peer: &HostInfo, _now: f64) {}

    /// Exchange routing state with the peer's engine at the start of a contact
    ///
    /// Called once per new connection, on the engine of the lower-addressed
    /// endpoint, after both engines have seen `connection_up`.
    fn do_exchange_for_new_connection(
        &mut self,
        _connection: &Connection,
        _this: &HostInfo,
        _peer: &HostInfo,
        _peer_engine: &mut dyn RoutingDecisionEngine,
        _now: f64,
    ) {
    }

    /// Should a locally created message be accepted into the buffer?
    fn new_message(&mut self, message: &mut Message) -> bool;

    /// Is `host` the final destination of `message`?
    fn is_final_dest(&self, message: &Message, host: HostAddress) -> bool {
        message.to() == host
    }

    /// Should a relayed message be stored by `this`?
    fn should_save_received_message(&mut self, message: &mut Message, this: &HostInfo) -> bool;

    /// Should `message` be offered to `other` now?
    fn should_send_message_to_host(&mut self, message: &Message, other: &HostInfo, this: &HostInfo)
    -> bool;

    /// Should the sender purge its copy after a completed transfer to `other`?
    fn should_delete_sent_message(&mut self, message: &mut Message, other: HostAddress) -> bool;

    /// May `message` be evicted to make room?
    fn should_delete_old_message(&mut self, message: &Message, host_reporting_old: HostAddress) -> bool;

    /// Periodic hook, called once per tick before forwarding
    fn update(&mut self, _this: &HostInfo, _now: f64) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
