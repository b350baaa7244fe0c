//! Direct delivery: a message only ever travels from its origin straight to
//! its destination.

use std::any::Any;

use serde_json::Value;

use courier_core::{ConfigError, HostAddress, HostInfo, Message, RunContext};

use crate::engine::RoutingDecisionEngine;

#[derive(Debug, Clone, Default)]
pub struct DirectDelivery;

impl DirectDelivery {
    pub const NAME: &'static str = "direct-delivery";

    pub fn from_settings(
        settings: &Value,
        _ctx: &mut RunContext,
    ) -> Result<Box<dyn RoutingDecisionEngine>, ConfigError> {
        if !(settings.is_null() || settings.as_object().is_some_and(|o| o.is_empty())) {
            return Err(ConfigError::InvalidSettings {
                name: Self::NAME.to_string(),
                reason: "takes no settings".to_string(),
            });
        }
        Ok(Box::new(Self))
    }
}

impl RoutingDecisionEngine for DirectDelivery {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn replicate(&self) -> Box<dyn RoutingDecisionEngine> {
        Box::new(Self)
    }

    fn new_message(&mut self, _message: &mut Message) -> bool {
        true
    }

    fn should_save_received_message(&mut self, message: &mut Message, this: &HostInfo) -> bool {
        message.to() == this.address
    }

    fn should_send_message_to_host(
        &mut self,
        message: &Message,
        other: &HostInfo,
        _this: &HostInfo,
    ) -> bool {
        message.to() == other.address
    }

    fn should_delete_sent_message(&mut self, _message: &mut Message, _other: HostAddress) -> bool {
        true
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
