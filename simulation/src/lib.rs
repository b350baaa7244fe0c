//! # Courier Simulation
//!
//! A contact-based DTN simulation built on the Courier routing engine.
//!
//! ## Overview
//!
//! Hosts move around a plane, carrying messages in bounded buffers. When two
//! hosts' radios come within range a connection opens, and each host's
//! router decides (through its pluggable decision engine) which messages to
//! hand over. Transfers take time proportional to message size, so a contact
//! that ends too early aborts the transfer in flight.
//!
//! ## Architecture
//!
//! - **Mobility** (`mobility.rs`): stationary, scripted and random-waypoint movement
//! - **Host** (`host.rs`): a node with interfaces, a router and a movement cursor
//! - **World** (`world.rs`): hosts, connections and the deterministic tick scheduler
//! - **Grid** (`grid.rs`): optional spatial index for contact detection
//! - **Generator** (`generator.rs`): seeded periodic message creation
//! - **Reports** (`report.rs`): event bus, message and contact statistics, search coverage
//! - **Snapshot** (`snapshot.rs`): serializable world state at tick boundaries
//! - **Config** (`config.rs`): JSON scenario files
//! - **Scenarios** (`scenarios.rs`): built-in demonstration runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_simulation::*;
//! use courier_core::{Coord, HostAddress, InterfaceSpec, Message};
//! use courier_routing::Epidemic;
//!
//! let mut world = World::new(WorldConfig::default())?;
//! let radio = [InterfaceSpec::new("radio", 10.0, 10.0)];
//! for x in [0.0, 5.0] {
//!     world.spawn_host("n", &radio, Box::new(Stationary::new(Coord::new(x, 0.0))), 1_000, &Epidemic::default());
//! }
//! world.create_message(Message::new("M1", HostAddress(0), HostAddress(1), 40, 0.0))?;
//! world.run_ticks(5)?;
//! ```

pub mod config;
pub mod generator;
pub mod grid;
pub mod host;
pub mod mobility;
pub mod report;
pub mod scenarios;
pub mod snapshot;
pub mod world;

// Re-export main types
pub use config::{GroupConfig, ScenarioConfig};
pub use generator::{MessageGenerator, MessageGeneratorConfig};
pub use grid::ConnectivityGrid;
pub use host::Host;
pub use mobility::{MobilityModel, MovementConfig, Path, RandomWaypoint, Scripted, Stationary, host_seed};
pub use report::{ContactReport, EventBus, EventLog, MessageStatsReport, SearchCoverage};
pub use snapshot::{HostSnapshot, WorldSnapshot};
pub use world::{World, WorldConfig};
