//! Searching agents
//!
//! Hosts running this engine roam the world looking for target hosts. A
//! target is recognised on contact either by its mobility kind (when
//! `target_mobility` is set) or by a name prefix. Every replica records its
//! finds in one [`DiscoveryRegistry`] shared through the
//! [`RunContext`], so the registry holds the union of all agents' discoveries
//! and is emptied when the context is reset for a new run.
//!
//! Messages are flooded and never purged.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use courier_core::{
    ConfigError, Discovery, DiscoveryRegistry, HostAddress, HostInfo, Message, RunContext,
};

use crate::engine::RoutingDecisionEngine;
use crate::registry::parse_settings;

/// Registry key the engine's discoveries are shared under
pub const REGISTRY_KEY: &str = "searching-agent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchingAgentConfig {
    /// Name prefix of target hosts
    /// Default: "S"
    pub target_prefix: String,
    /// Mobility kind of target hosts; checked before the prefix
    pub target_mobility: Option<String>,
}

impl Default for SearchingAgentConfig {
    fn default() -> Self {
        Self {
            target_prefix: "S".to_string(),
            target_mobility: None,
        }
    }
}

/// What a coverage report needs to know about a searching engine
pub trait SearchReporting {
    fn target_prefix(&self) -> &str;

    fn target_mobility(&self) -> Option<&str>;

    /// Hosts discovered so far by any agent, in address order
    fn discovered_nodes(&self) -> Vec<Discovery>;

    /// Time of the first discovery of the run
    fn initial_discovery(&self) -> Option<f64>;
}

#[derive(Debug, Clone)]
pub struct SearchingAgent {
    config: SearchingAgentConfig,
    registry: DiscoveryRegistry,
}

impl SearchingAgent {
    pub const NAME: &'static str = "searching-agent";

    pub fn new(config: SearchingAgentConfig, registry: DiscoveryRegistry) -> Self {
        Self { config, registry }
    }

    pub fn from_settings(
        settings: &Value,
        ctx: &mut RunContext,
    ) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError> {
        let config: SearchingAgentConfig = parse_settings(Self::NAME, settings)?;
        Ok(Box::new(Self::new(config, ctx.discovery_registry(REGISTRY_KEY))))
    }

    pub fn registry(&self) -> &DiscoveryRegistry {
        &self.registry
    }

    /// Does `host` match the search target?
    pub fn is_target(&self, host: &HostInfo) -> bool {
        match &self.config.target_mobility {
            Some(kind) if *kind == *host.mobility => true,
            _ => host.name.starts_with(self.config.target_prefix.as_str()),
        }
    }
}

impl SearchReporting for SearchingAgent {
    fn target_prefix(&self) -> &str {
        &self.config.target_prefix
    }

    fn target_mobility(&self) -> Option<&str> {
        self.config.target_mobility.as_deref()
    }

    fn discovered_nodes(&self) -> Vec<Discovery> {
        self.registry.discovered()
    }

    fn initial_discovery(&self) -> Option<f64> {
        self.registry.initial_discovery()
    }
}

impl RoutingDecisionEngine for SearchingAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Settings are copied; the registry handle is shared
    fn replicate(&self) -> Box<dyn RoutingDecisionEngine> {
        Box::new(self.clone())
    }

    fn connection_up(&mut self, this: &HostInfo, peer: &HostInfo, now: f64) {
        if peer.address == this.address || !self.is_target(peer) {
            return;
        }
        if self.registry.record(peer.address, &peer.name, this.address, now) {
            info!(
                agent = %this.name,
                target = %peer.name,
                time = now,
                "Discovered searchable host"
            );
        }
    }

    fn new_message(&mut self, _message: &mut Message) -> bool {
        true
    }

    // Buffered copies are already refused as duplicates by the router
    fn should_save_received_message(&mut self, _message: &mut Message, _this: &HostInfo) -> bool {
        true
    }

    fn should_send_message_to_host(
        &mut self,
        _message: &Message,
        _other: &HostInfo,
        _this: &HostInfo,
    ) -> bool {
        true
    }

    fn should_delete_sent_message(&mut self, _message: &mut Message, _other: HostAddress) -> bool {
        false
    }

    fn should_delete_old_message(&mut self, _message: &Message, _host_reporting_old: HostAddress) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
