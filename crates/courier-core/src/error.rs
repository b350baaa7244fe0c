//! Error types for the Courier engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::MessageId;
use crate::types::HostAddress;

/// Top-level error type for Courier
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Message rejected: {0}")]
    Receive(#[from] ReceiveError),

    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
}

/// Setup errors. These are fatal: a run never starts with an invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown interface '{0}'")]
    UnknownInterface(String),

    #[error("Unknown routing engine '{0}'")]
    UnknownEngine(String),

    #[error("Invalid settings for '{name}': {reason}")]
    InvalidSettings { name: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Could not read scenario file: {0}")]
    Io(String),

    #[error("Could not parse scenario: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Why a router refused a message
///
/// These are result codes returned to the caller, not failures of the run.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveError {
    /// The message is already buffered or was already delivered here
    #[error("duplicate message")]
    Duplicate,

    /// The decision engine refused the message
    #[error("rejected by routing policy")]
    Policy,

    /// Not enough buffer space even after eviction
    #[error("not enough buffer space")]
    NoSpace,

    /// The message's time-to-live has run out
    #[error("message expired")]
    Expired,
}

/// Errors for administrative requests that name hosts, interfaces or messages
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("No such host: {0}")]
    NoSuchHost(HostAddress),

    #[error("Host {host} has no interface '{interface}'")]
    NoSuchInterface { host: HostAddress, interface: String },

    #[error("Interface types do not match ({a} vs {b}); name the interface type explicitly")]
    InterfaceMismatch { a: String, b: String },

    #[error("Host {host} has no message '{message}'")]
    NoSuchMessage { host: HostAddress, message: MessageId },

    #[error("A host cannot connect to itself ({0})")]
    SelfConnection(HostAddress),
}

/// Clock misuse
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClockError {
    #[error("Invalid time increment {0}")]
    InvalidIncrement(f64),

    #[error("Cannot move the clock backwards from {current} to {target}")]
    Backwards { current: f64, target: f64 },
}

/// Result type for Courier operations
pub type CourierResult<T> = Result<T, CourierError>;
