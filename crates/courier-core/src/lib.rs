//! # Courier Core
//!
//! Core types for the Courier delay-tolerant network engine.
//!
//! Courier simulates mobile hosts that exchange messages opportunistically
//! whenever two of their radios come within range of each other. Messages are
//! stored, carried and forwarded hop by hop instead of travelling along an
//! end-to-end path.
//!
//! This crate holds the leaves of the engine's dependency graph:
//!
//! - [`clock`]: The run-scoped virtual clock advanced by the scheduler
//! - [`context`]: The run-scoped counters and shared registries (reset at run start)
//! - [`message`]: Messages with an append-only path and a mutable property bag
//! - [`interface`]: Network interfaces and range-based contact detection
//! - [`connection`]: Connections between interfaces and their transfer progress
//! - [`event`]: Events and snapshots published to reporting listeners
//! - [`error`]: Error types shared by every Courier crate
//!
//! ## Determinism
//!
//! Nothing in this crate reads wall-clock time, spawns threads or iterates a
//! hash map. Every ordered collection is a `Vec` or a `BTree*` so that two
//! runs with the same configuration observe the same ordering.

pub mod clock;
pub mod connection;
pub mod context;
pub mod coord;
pub mod error;
pub mod event;
pub mod interface;
pub mod message;
pub mod types;

// Re-export main types
pub use clock::SimClock;
pub use connection::{AbortedTransfer, Connection, ConnectionState, ConnectionTable, Transfer};
pub use context::{Discovery, DiscoveryRegistry, RunContext};
pub use coord::Coord;
pub use error::{ClockError, ConfigError, CourierError, CourierResult, HostError, ReceiveError};
pub use event::{
    ConnectionSnapshot, EventListener, MessageSnapshot, SimEvent, TimedEvent, TransferSnapshot,
};
pub use interface::{InterfaceSpec, NetworkInterface};
pub use message::{Message, MessageId, PropertyValue};
pub use types::{ConnectionId, HostAddress, HostInfo, InterfaceRef};
