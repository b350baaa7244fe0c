//! Periodic message generation
//!
//! Creates one message every `interval` seconds (drawn uniformly from the
//! configured range) between a random source in `hosts` and a random
//! destination in `to_hosts` (or `hosts` when unset), never the source
//! itself. Ids are the prefix followed by a running counter: `M1`, `M2`, ...

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use courier_core::{ConfigError, HostAddress, Message};

fn default_prefix() -> String {
    "M".to_string()
}

/// Generator settings as they appear in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageGeneratorConfig {
    /// Seconds between messages, `[min, max]`
    pub interval: [f64; 2],
    /// Message size in bytes, `[min, max]`
    pub size: [u64; 2],
    /// Source address range, `[from, to)`
    pub hosts: [u32; 2],
    /// Destination address range, `[from, to)`; defaults to `hosts`
    #[serde(default)]
    pub to_hosts: Option<[u32; 2]>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Time-to-live given to every generated message
    #[serde(default)]
    pub ttl: Option<f64>,
    /// No message before this time
    #[serde(default)]
    pub start: f64,
    /// No message after this time
    #[serde(default)]
    pub stop: Option<f64>,
}

impl MessageGeneratorConfig {
    fn to_range(&self) -> [u32; 2] {
        self.to_hosts.unwrap_or(self.hosts)
    }

    pub fn validate(&self, host_count: usize) -> Result<(), ConfigError> {
        let [lo, hi] = self.interval;
        if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
            return Err(ConfigError::invalid_value(
                "messages.interval",
                format!("[{lo}, {hi}] is not a positive range"),
            ));
        }
        if self.size[0] > self.size[1] {
            return Err(ConfigError::invalid_value("messages.size", "min exceeds max"));
        }
        for (field, [from, to]) in [("messages.hosts", self.hosts), ("messages.to_hosts", self.to_range())] {
            if from >= to || to as usize > host_count {
                return Err(ConfigError::invalid_value(
                    field,
                    format!("[{from}, {to}) is empty or exceeds {host_count} hosts"),
                ));
            }
        }
        let [to_from, to_to] = self.to_range();
        let overlaps = to_from < self.hosts[1] && self.hosts[0] < to_to;
        if overlaps && to_to - to_from < 2 {
            return Err(ConfigError::invalid_value(
                "messages.to_hosts",
                "needs at least two hosts when it overlaps the sources",
            ));
        }
        if let Some(ttl) = self.ttl {
            if !(ttl.is_finite() && ttl > 0.0) {
                return Err(ConfigError::invalid_value("messages.ttl", "must be positive"));
            }
        }
        Ok(())
    }
}

/// Seeded message source driven by the world clock
#[derive(Debug, Clone)]
pub struct MessageGenerator {
    config: MessageGeneratorConfig,
    rng: ChaCha8Rng,
    next_time: f64,
    counter: u64,
}

impl MessageGenerator {
    pub fn new(config: MessageGeneratorConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let next_time = config.start + draw(&mut rng, config.interval);
        Self {
            config,
            rng,
            next_time,
            counter: 0,
        }
    }

    pub fn config(&self) -> &MessageGeneratorConfig {
        &self.config
    }

    /// Time of the next message
    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    pub fn generated(&self) -> u64 {
        self.counter
    }

    /// Every message due at or before `now`
    pub fn due(&mut self, now: f64) -> Vec<Message> {
        let mut due = Vec::new();
        while self.next_time <= now && self.config.stop.is_none_or(|stop| self.next_time <= stop) {
            due.push(self.generate(self.next_time));
            self.next_time += draw(&mut self.rng, self.config.interval);
        }
        due
    }

    fn generate(&mut self, created_at: f64) -> Message {
        let [from_lo, from_hi] = self.config.hosts;
        let from = self.rng.random_range(from_lo..from_hi);

        let [to_lo, to_hi] = self.config.to_range();
        let to = if (to_lo..to_hi).contains(&from) {
            // Draw from the range minus the source, then shift past it
            let pick = self.rng.random_range(to_lo..to_hi - 1);
            if pick >= from { pick + 1 } else { pick }
        } else {
            self.rng.random_range(to_lo..to_hi)
        };

        let [size_lo, size_hi] = self.config.size;
        let size = self.rng.random_range(size_lo..=size_hi);

        self.counter += 1;
        let id = format!("{}{}", self.config.prefix, self.counter);
        let message = Message::new(id, HostAddress(from), HostAddress(to), size, created_at);
        match self.config.ttl {
            Some(ttl) => message.with_ttl(ttl),
            None => message,
        }
    }
}

fn draw(rng: &mut ChaCha8Rng, [lo, hi]: [f64; 2]) -> f64 {
    if lo >= hi { lo } else { rng.random_range(lo..=hi) }
}
