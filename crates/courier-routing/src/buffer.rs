//! Fixed-capacity message buffer
//!
//! Messages are kept in arrival order. That order is what the router scans
//! when looking for something to forward, and it breaks ties in the eviction
//! order.

use courier_core::{Message, MessageId};

#[derive(Debug, Clone)]
pub struct MessageBuffer {
    capacity: u64,
    used: u64,
    messages: Vec<Message>,
}

impl MessageBuffer {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: 0,
            messages: Vec::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes held by buffered messages
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Bytes still free; zero when over-full
    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }

    /// Used space as a percentage of capacity
    ///
    /// Exceeds 100 only while a single oversized message is held.
    pub fn occupancy(&self) -> f64 {
        if self.capacity == 0 {
            return if self.used == 0 { 0.0 } else { f64::INFINITY };
        }
        self.used as f64 / self.capacity as f64 * 100.0
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == id)
    }

    /// Append a message; the caller has already made room
    pub fn insert(&mut self, message: Message) {
        debug_assert!(!self.contains(message.id()), "{} buffered twice", message.id());
        self.used += message.size();
        self.messages.push(message);
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.position(id)?;
        let message = self.messages.remove(index);
        self.used -= message.size();
        Some(message)
    }

    /// Messages in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id().clone()).collect()
    }

    /// Eviction candidates: oldest received first, arrival order on ties
    pub fn eviction_order(&self) -> Vec<MessageId> {
        let mut order: Vec<&Message> = self.messages.iter().collect();
        order.sort_by(|a, b| a.received_at().total_cmp(&b.received_at()));
        order.into_iter().map(|m| m.id().clone()).collect()
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }
}
