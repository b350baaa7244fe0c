//! Spray-and-wait routing
//!
//! A message starts with a fixed budget of copies, stored in its property
//! bag. While a holder has more than one copy it may hand some to any peer
//! (the spray phase); with a single copy left it waits and only delivers
//! directly to the destination.
//!
//! In binary mode a holder with `n` copies gives `ceil(n/2)` to the peer and
//! keeps `floor(n/2)`. In source mode it gives exactly one.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_core::{ConfigError, HostAddress, HostInfo, Message, PropertyValue, RunContext};

use crate::engine::RoutingDecisionEngine;
use crate::registry::parse_settings;

/// Property key holding a copy's remaining budget
pub const COPIES_PROPERTY: &str = "SprayAndWait.copies";

/// Configuration for spray-and-wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprayAndWaitConfig {
    /// Copies given to each new message
    /// Default: 6
    pub copies: i64,
    /// Split the budget in half on every hop (vs. one copy per hop)
    /// Default: true
    pub binary: bool,
}

impl Default for SprayAndWaitConfig {
    fn default() -> Self {
        Self {
            copies: 6,
            binary: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SprayAndWait {
    config: SprayAndWaitConfig,
}

impl SprayAndWait {
    pub const NAME: &'static str = "spray-and-wait";

    pub fn new(config: SprayAndWaitConfig) -> Self {
        Self { config }
    }

    pub fn from_settings(
        settings: &Value,
        _ctx: &mut RunContext,
    ) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError> {
        let config: SprayAndWaitConfig = parse_settings(Self::NAME, settings)?;
        if config.copies < 1 {
            return Err(ConfigError::InvalidSettings {
                name: Self::NAME.to_string(),
                reason: format!("copies must be at least 1, got {}", config.copies),
            });
        }
        Ok(Box::new(Self::new(config)))
    }

    /// Remaining copy budget carried by a message
    pub fn copies(message: &Message) -> i64 {
        message
            .property(COPIES_PROPERTY)
            .and_then(PropertyValue::as_int)
            .unwrap_or(1)
    }

    /// Copies handed over when a holder with `n` copies relays
    fn handed_over(&self, n: i64) -> i64 {
        if self.config.binary { (n + 1) / 2 } else { 1 }
    }
}

impl RoutingDecisionEngine for SprayAndWait {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn replicate(&self) -> Box<dyn RoutingDecisionEngine> {
        Box::new(self.clone())
    }

    fn new_message(&mut self, message: &mut Message) -> bool {
        message.set_property(COPIES_PROPERTY, PropertyValue::Int(self.config.copies));
        true
    }

    fn should_save_received_message(&mut self, message: &mut Message, _this: &HostInfo) -> bool {
        // The wire copy still carries the sender's budget
        let received = self.handed_over(Self::copies(message));
        message.set_property(COPIES_PROPERTY, PropertyValue::Int(received));
        true
    }

    fn should_send_message_to_host(
        &mut self,
        message: &Message,
        other: &HostInfo,
        _this: &HostInfo,
    ) -> bool {
        message.to() == other.address || Self::copies(message) > 1
    }

    fn should_delete_sent_message(&mut self, message: &mut Message, other: HostAddress) -> bool {
        if message.to() == other {
            return true;
        }
        let n = Self::copies(message);
        let kept = n - self.handed_over(n);
        message.set_property(COPIES_PROPERTY, PropertyValue::Int(kept));
        kept < 1
    }

    fn should_delete_old_message(&mut self, _message: &Message, _host_reporting_old: HostAddress) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
