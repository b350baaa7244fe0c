//! Events published to reporting listeners
//!
//! Listeners receive [`TimedEvent`]s by shared reference and only ever see
//! owned snapshots, never live engine state.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::error::ReceiveError;
use crate::message::{Message, MessageId};
use crate::types::{ConnectionId, HostAddress, InterfaceRef};

/// Immutable view of a message at the time of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub from: HostAddress,
    pub to: HostAddress,
    pub size: u64,
    pub created_at: f64,
    pub path: Vec<HostAddress>,
    pub hop_count: usize,
}

impl From<&Message> for MessageSnapshot {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id().clone(),
            from: m.from(),
            to: m.to(),
            size: m.size(),
            created_at: m.created_at(),
            path: m.path().to_vec(),
            hop_count: m.hop_count(),
        }
    }
}

/// Progress of an in-flight transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    pub message: MessageId,
    pub from: HostAddress,
    pub to: HostAddress,
    pub bytes_done: f64,
    pub total: u64,
}

/// Immutable view of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub a: InterfaceRef,
    pub b: InterfaceRef,
    pub state: ConnectionState,
    pub speed: f64,
    pub opened_at: f64,
    pub transfer: Option<TransferSnapshot>,
}

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    MessageCreated {
        host: HostAddress,
        message: MessageSnapshot,
    },
    TransferStarted {
        connection: ConnectionId,
        from: HostAddress,
        to: HostAddress,
        message: MessageId,
    },
    MessageTransferred {
        from: HostAddress,
        to: HostAddress,
        message: MessageSnapshot,
        /// The receiver was the final destination
        final_delivery: bool,
        /// First time this message reached its destination
        first_delivery: bool,
    },
    TransferAborted {
        connection: ConnectionId,
        from: HostAddress,
        to: HostAddress,
        message: MessageId,
        bytes_remaining: u64,
    },
    MessageDeleted {
        host: HostAddress,
        message: MessageId,
        /// Counted as a drop rather than an ordinary removal
        dropped: bool,
    },
    MessageRejected {
        host: HostAddress,
        /// `None` for locally created messages
        from: Option<HostAddress>,
        message: MessageId,
        reason: ReceiveError,
    },
    ConnectionUp {
        connection: ConnectionSnapshot,
    },
    ConnectionDown {
        connection: ConnectionSnapshot,
    },
}

impl SimEvent {
    /// Short name used in trace output
    pub fn kind(&self) -> &'static str {
        match self {
            SimEvent::MessageCreated { .. } => "message_created",
            SimEvent::TransferStarted { .. } => "transfer_started",
            SimEvent::MessageTransferred { .. } => "message_transferred",
            SimEvent::TransferAborted { .. } => "transfer_aborted",
            SimEvent::MessageDeleted { .. } => "message_deleted",
            SimEvent::MessageRejected { .. } => "message_rejected",
            SimEvent::ConnectionUp { .. } => "connection_up",
            SimEvent::ConnectionDown { .. } => "connection_down",
        }
    }
}

/// An event stamped with the simulation time it happened at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub time: f64,
    #[serde(flatten)]
    pub event: SimEvent,
}

/// Receiver of engine events
///
/// Listeners observe; they have no handle through which to change the run.
pub trait EventListener {
    fn on_event(&mut self, event: &TimedEvent);

    /// Called once when the run ends
    fn done(&mut self, _end_time: f64) {}
}

/// Shared handle, so a caller can keep reading a listener it registered
impl<L: EventListener + ?Sized> EventListener for Rc<RefCell<L>> {
    fn on_event(&mut self, event: &TimedEvent) {
        self.borrow_mut().on_event(event);
    }

    fn done(&mut self, end_time: f64) {
        self.borrow_mut().done(end_time);
    }
}
