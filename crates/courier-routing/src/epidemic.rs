//! Epidemic routing
//!
//! The reference strategy: every message is offered to every peer that does
//! not already hold it. Delivery probability is maximal at the cost of
//! bandwidth and buffer space. An optional hop limit bounds the flood.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_core::{ConfigError, HostAddress, HostInfo, Message, RunContext};

use crate::engine::RoutingDecisionEngine;
use crate::registry::parse_settings;

/// Configuration for epidemic routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpidemicConfig {
    /// Purge the sender's copy once it has been handed to its destination
    /// Default: true
    pub delete_delivered: bool,
    /// Stop relaying after this many hops (the destination is always reachable)
    /// Default: unlimited
    pub max_hops: Option<usize>,
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        Self {
            delete_delivered: true,
            max_hops: None,
        }
    }
}

/// Flood-based decision engine
#[derive(Debug, Clone, Default)]
pub struct Epidemic {
    config: EpidemicConfig,
}

impl Epidemic {
    pub const NAME: &'static str = "epidemic";

    pub fn new(config: EpidemicConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EpidemicConfig {
        &self.config
    }

    pub fn from_settings(
        settings: &Value,
        _ctx: &mut RunContext,
    ) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError> {
        let config: EpidemicConfig = parse_settings(Self::NAME, settings)?;
        if config.max_hops == Some(0) {
            return Err(ConfigError::InvalidSettings {
                name: Self::NAME.to_string(),
                reason: "max_hops must be at least 1".to_string(),
            });
        }
        Ok(Box::new(Self::new(config)))
    }
}

impl RoutingDecisionEngine for Epidemic {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn replicate(&self) -> Box<dyn RoutingDecisionEngine> {
        Box::new(self.clone())
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
        match self.config.max_hops {
            // Relaying to a non-destination adds a hop
            Some(limit) => message.hop_count() + 1 < limit,
            None => true,
        }
    }

    fn should_delete_sent_message(&mut self, message: &mut Message, other: HostAddress) -> bool {
        self.config.delete_delivered && message.to() == other
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
