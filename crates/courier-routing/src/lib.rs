//! # Courier Routing
//!
//! Store-carry-forward routing for the Courier DTN engine.
//!
//! Each host owns one [`Router`]: a fixed-capacity [`MessageBuffer`] plus the
//! message lifecycle (admission, eviction, forwarding, delivery, deletion).
//! The forwarding policy is pluggable: the router consults a
//! [`RoutingDecisionEngine`] at every gate, so new algorithms never touch the
//! router itself.
//!
//! ## Strategies
//!
//! - [`epidemic`]: Flood every message to every peer (the reference strategy)
//! - [`direct`]: Hand a message only to its destination
//! - [`spray_and_wait`]: Spread a bounded number of copies, then wait
//! - [`prophet`]: Forward towards peers with a higher delivery predictability
//! - [`searching`]: Searching agents that record target hosts they meet
//!
//! Strategies are looked up by name through an [`EngineRegistry`], which is
//! how scenario files select them.

pub mod buffer;
pub mod direct;
pub mod engine;
pub mod epidemic;
pub mod prophet;
pub mod registry;
pub mod router;
pub mod searching;
pub mod spray_and_wait;

// Re-export main types
pub use buffer::MessageBuffer;
pub use direct::DirectDelivery;
pub use engine::RoutingDecisionEngine;
pub use epidemic::{Epidemic, EpidemicConfig};
pub use prophet::{Prophet, ProphetConfig};
pub use registry::{EngineConfig, EngineConstructor, EngineRegistry, parse_settings};
pub use router::{Router, RouterStats, TransferOutcome};
pub use searching::{SearchReporting, SearchingAgent, SearchingAgentConfig};
pub use spray_and_wait::{SprayAndWait, SprayAndWaitConfig};
