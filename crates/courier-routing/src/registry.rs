//! Name-to-constructor registry for decision engines
//!
//! Scenario files name a strategy (`"epidemic"`, `"prophet"`, ...) together
//! with a free-form JSON `settings` object. The registry turns that pair into
//! a configured prototype engine, which hosts then
//! [`replicate`](crate::RoutingDecisionEngine::replicate).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_core::{ConfigError, RunContext};

use crate::direct::DirectDelivery;
use crate::engine::RoutingDecisionEngine;
use crate::epidemic::Epidemic;
use crate::prophet::Prophet;
use crate::searching::SearchingAgent;
use crate::spray_and_wait::SprayAndWait;

/// Strategy selection as it appears in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    #[serde(default)]
    pub settings: Value,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Value::Null,
        }
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }
}

/// Builds a configured prototype engine from its settings
pub type EngineConstructor =
    fn(&Value, &mut RunContext) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError>;

/// Registered strategies, keyed by name
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    constructors: BTreeMap<String, EngineConstructor>,
}

impl EngineRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every strategy shipped with this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Epidemic::NAME, Epidemic::from_settings);
        registry.register(DirectDelivery::NAME, DirectDelivery::from_settings);
        registry.register(SprayAndWait::NAME, SprayAndWait::from_settings);
        registry.register(Prophet::NAME, Prophet::from_settings);
        registry.register(SearchingAgent::NAME, SearchingAgent::from_settings);
        registry
    }

    /// Add (or replace) a strategy
    pub fn register(&mut self, name: impl Into<String>, constructor: EngineConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Build the prototype engine described by `config`
    ///
    /// # Errors
    ///
    /// `ConfigError::UnknownEngine` for an unregistered name, or whatever the
    /// strategy reports for invalid settings.
    pub fn build(
        &self,
        config: &EngineConfig,
        ctx: &mut RunContext,
    ) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError> {
        let constructor = self
            .constructors
            .get(&config.name)
            .ok_or_else(|| ConfigError::UnknownEngine(config.name.clone()))?;
        constructor(&config.settings, ctx)
    }
}

/// Decode a strategy's settings object; `null` yields the defaults
pub fn parse_settings<T: DeserializeOwned + Default>(
    name: &str,
    settings: &Value,
) -> Result<T, ConfigError> {
    if settings.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(settings.clone()).map_err(|e| ConfigError::InvalidSettings {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
