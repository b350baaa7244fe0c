//! Scenario files
//!
//! A scenario is a JSON document describing the world, the interface types,
//! the host groups (with their routing strategy and movement) and an
//! optional message generator:
//!
//! ```json
//! {
//!   "name": "relay",
//!   "seed": 7,
//!   "end_time": 600,
//!   "world_size": [1000, 1000],
//!   "interfaces": { "radio": { "interface_type": "radio", "range": 50, "speed": 250 } },
//!   "groups": [{
//!     "prefix": "n", "count": 20, "buffer_size": 5000, "interfaces": ["radio"],
//!     "engine": { "name": "epidemic" },
//!     "movement": { "model": "random-waypoint", "min_speed": 0.5, "max_speed": 1.5 }
//!   }]
//! }
//! ```
//!
//! Parsing only checks the shape of the document. Values and names are
//! checked by [`ScenarioConfig::validate`], which [`ScenarioConfig::build_world`]
//! always runs first, so a run never starts from a broken configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use courier_core::{ConfigError, InterfaceSpec};
use courier_routing::{EngineConfig, EngineRegistry};

use crate::generator::{MessageGenerator, MessageGeneratorConfig};
use crate::mobility::{MovementConfig, host_seed};
use crate::world::{World, WorldConfig};

fn default_update_interval() -> f64 {
    1.0
}

fn default_world_size() -> [f64; 2] {
    [1000.0, 1000.0]
}

fn default_true() -> bool {
    true
}

/// One group of identically configured hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Name prefix; hosts are named prefix + address
    pub prefix: String,
    pub count: usize,
    /// Buffer capacity in bytes
    pub buffer_size: u64,
    /// Names of entries in the scenario's `interfaces` table
    pub interfaces: Vec<String>,
    pub engine: EngineConfig,
    pub movement: MovementConfig,
}

/// A complete scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub seed: u64,
    pub end_time: f64,
    #[serde(default = "default_update_interval")]
    pub update_interval: f64,
    #[serde(default = "default_world_size")]
    pub world_size: [f64; 2],
    pub interfaces: BTreeMap<String, InterfaceSpec>,
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub messages: Option<MessageGeneratorConfig>,
    /// Use the grid index for contact detection
    #[serde(default)]
    pub connectivity_grid: bool,
    #[serde(default = "default_true")]
    pub record_events: bool,
}

impl ScenarioConfig {
    /// Read a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), name = %config.name, "Scenario loaded");
        Ok(config)
    }

    /// Parse a scenario from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn host_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    fn world_config(&self) -> WorldConfig {
        let longest = self.interfaces.values().map(|i| i.range).fold(0.0, f64::max);
        WorldConfig {
            update_interval: self.update_interval,
            end_time: self.end_time,
            simulate_connections: true,
            grid_cell_size: (self.connectivity_grid && longest > 0.0).then_some(longest),
            record_events: self.record_events,
        }
    }

    /// Check every value and resolve every name against the built-in engines
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(&EngineRegistry::with_builtin())
    }

    /// Check every value and resolve every name against `registry`
    pub fn validate_with(&self, registry: &EngineRegistry) -> Result<(), ConfigError> {
        self.world_config().validate()?;
        let [w, h] = self.world_size;
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(ConfigError::invalid_value("world_size", "must be positive"));
        }
        for spec in self.interfaces.values() {
            spec.validate()?;
        }
        if self.groups.is_empty() {
            return Err(ConfigError::invalid_value("groups", "at least one group is required"));
        }

        for group in &self.groups {
            if group.count == 0 {
                return Err(ConfigError::invalid_value(
                    format!("groups.{}.count", group.prefix),
                    "must be at least 1",
                ));
            }
            for name in &group.interfaces {
                if !self.interfaces.contains_key(name) {
                    return Err(ConfigError::UnknownInterface(name.clone()));
                }
            }
            if !registry.contains(&group.engine.name) {
                return Err(ConfigError::UnknownEngine(group.engine.name.clone()));
            }
            group.movement.validate(&group.prefix)?;
        }

        if let Some(messages) = &self.messages {
            messages.validate(self.host_count())?;
        }
        Ok(())
    }

    /// Build a ready-to-run world
    ///
    /// Engine settings are parsed here; a bad setting is a [`ConfigError`].
    pub fn build_world(&self, registry: &EngineRegistry) -> Result<World, ConfigError> {
        self.validate_with(registry)?;
        let mut world = World::new(self.world_config())?;
        let [w, h] = self.world_size;

        for group in &self.groups {
            let interfaces: Vec<InterfaceSpec> = group
                .interfaces
                .iter()
                .filter_map(|name| self.interfaces.get(name).cloned())
                .collect();
            let prototype = registry.build(&group.engine, world.context_mut())?;

            for member in 0..group.count {
                let address = world.context().host_count() as u32;
                let mobility = group
                    .movement
                    .clone_for_host(member, host_seed(self.seed, address), (w, h));
                world.spawn_host(
                    &group.prefix,
                    &interfaces,
                    mobility,
                    group.buffer_size,
                    prototype.as_ref(),
                );
            }
            debug!(
                group = %group.prefix,
                count = group.count,
                engine = %group.engine.name,
                movement = group.movement.kind(),
                "Group created"
            );
        }

        if let Some(messages) = &self.messages {
            world.set_generator(MessageGenerator::new(messages.clone(), self.seed))?;
        }

        info!(
            scenario = %self.name,
            hosts = world.hosts().len(),
            seed = self.seed,
            "World built"
        );
        Ok(world)
    }
}
