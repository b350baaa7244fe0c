//! Messages carried through the network
//!
//! A message has an immutable identity (id, endpoints, size, creation time)
//! and mutable routing metadata: the ordered path of hosts it has visited and
//! a property bag that decision engines use for per-message state such as
//! remaining copy counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::HostAddress;

/// Unique identifier of a message within a run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Value stored in a message's property bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One unit of data routed through the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    from: HostAddress,
    to: HostAddress,
    size: u64,
    created_at: f64,
    received_at: f64,
    /// Time-to-live in seconds, counted from `created_at`
    ttl: Option<f64>,
    response_size: u64,
    app_id: Option<String>,
    properties: BTreeMap<String, PropertyValue>,
    /// Hosts visited so far; starts with the origin
    path: Vec<HostAddress>,
}

impl Message {
    /// Create a message originating at `from`
    pub fn new(
        id: impl Into<MessageId>,
        from: HostAddress,
        to: HostAddress,
        size: u64,
        created_at: f64,
    ) -> Self {
        Self {
            id: id.into(),
            from,
            to,
            size,
            created_at,
            received_at: created_at,
            ttl: None,
            response_size: 0,
            app_id: None,
            properties: BTreeMap::new(),
            path: vec![from],
        }
    }

    /// Set a time-to-live in seconds
    pub fn with_ttl(mut self, ttl: f64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Ask the destination to answer with a response of `size` bytes
    pub fn with_response_size(mut self, size: u64) -> Self {
        self.response_size = size;
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn from(&self) -> HostAddress {
        self.from
    }

    pub fn to(&self) -> HostAddress {
        self.to
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// When the current holder received (or created) this copy
    pub fn received_at(&self) -> f64 {
        self.received_at
    }

    pub fn set_received_at(&mut self, time: f64) {
        self.received_at = time;
    }

    pub fn ttl(&self) -> Option<f64> {
        self.ttl
    }

    pub fn response_size(&self) -> u64 {
        self.response_size
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Seconds of life left at `now`, or `None` for messages without a TTL
    pub fn ttl_remaining(&self, now: f64) -> Option<f64> {
        self.ttl.map(|ttl| self.created_at + ttl - now)
    }

    pub fn is_expired(&self, now: f64) -> bool {
        self.ttl_remaining(now).is_some_and(|left| left <= 0.0)
    }

    /// Hosts visited so far, in visitation order
    pub fn path(&self) -> &[HostAddress] {
        &self.path
    }

    /// Number of hops travelled
    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn has_visited(&self, host: HostAddress) -> bool {
        self.path.contains(&host)
    }

    /// Append a host to the path after a successful hop
    pub fn add_node_on_path(&mut self, host: HostAddress) {
        debug_assert!(
            self.path.last() != Some(&host),
            "host {host} appended twice to the path of {}",
            self.id
        );
        self.path.push(host);
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// The copy of this message that goes on the wire
    ///
    /// Every field is copied, so routing metadata is never shared between
    /// the sender's buffer and the receiver.
    pub fn replicate(&self) -> Message {
        self.clone()
    }
}
