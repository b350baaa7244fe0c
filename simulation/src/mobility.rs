//! Mobility collaborators
//!
//! A host does not decide where to go; it asks its [`MobilityModel`] for a
//! [`Path`] (a finite list of waypoints and a speed), walks it, and asks for
//! another when it is exhausted. Models that have nothing to offer return
//! `None` together with the time at which they might.
//!
//! Three models are provided:
//! - **stationary**: never moves
//! - **scripted**: walks a fixed waypoint list, optionally on repeat
//! - **random-waypoint**: picks uniformly random destinations and speeds,
//!   pausing between legs, from a per-host seeded generator

use std::collections::VecDeque;
use std::fmt::Debug;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use courier_core::{ConfigError, Coord};

/// A finite sequence of waypoints travelled at one speed
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    waypoints: VecDeque<Coord>,
    speed: f64,
}

impl Path {
    pub fn new(speed: f64) -> Self {
        Self {
            waypoints: VecDeque::new(),
            speed,
        }
    }

    pub fn from_waypoints(waypoints: impl IntoIterator<Item = Coord>, speed: f64) -> Self {
        Self {
            waypoints: waypoints.into_iter().collect(),
            speed,
        }
    }

    pub fn add_waypoint(&mut self, waypoint: Coord) {
        self.waypoints.push_back(waypoint);
    }

    /// Consume the next waypoint
    pub fn next_waypoint(&mut self) -> Option<Coord> {
        self.waypoints.pop_front()
    }

    pub fn has_next(&self) -> bool {
        !self.waypoints.is_empty()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Source of movement for one host
pub trait MobilityModel: Debug {
    /// Kind tag, exposed to decision engines through `HostInfo::mobility`
    fn kind(&self) -> &'static str;

    /// Where the host starts
    fn initial_location(&mut self) -> Coord;

    /// The next path to walk, or `None` if there is nothing to do yet
    fn path(&mut self, now: f64) -> Option<Path>;

    /// Earliest time a new path may be available
    fn next_path_available(&mut self, now: f64) -> f64;

    /// Whether the host is active (moving and radio on) at `now`
    fn is_active(&self, _now: f64) -> bool {
        true
    }
}

/// A host that stays put
#[derive(Debug, Clone)]
pub struct Stationary {
    location: Coord,
}

impl Stationary {
    pub const KIND: &'static str = "stationary";

    pub fn new(location: Coord) -> Self {
        Self { location }
    }
}

impl MobilityModel for Stationary {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn initial_location(&mut self) -> Coord {
        self.location
    }

    fn path(&mut self, _now: f64) -> Option<Path> {
        None
    }

    fn next_path_available(&mut self, _now: f64) -> f64 {
        f64::INFINITY
    }
}

/// Walks a fixed list of waypoints, starting at the first
#[derive(Debug, Clone)]
pub struct Scripted {
    waypoints: Vec<Coord>,
    speed: f64,
    repeat: bool,
    start_time: f64,
    handed_out: bool,
}

impl Scripted {
    pub const KIND: &'static str = "scripted";

    pub fn new(waypoints: Vec<Coord>, speed: f64) -> Self {
        Self {
            waypoints,
            speed,
            repeat: false,
            start_time: 0.0,
            handed_out: false,
        }
    }

    /// Walk the list again (from the first waypoint) whenever it is finished
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Stay inactive until `start_time`
    pub fn starting_at(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }
}

impl MobilityModel for Scripted {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn initial_location(&mut self) -> Coord {
        self.waypoints.first().copied().unwrap_or_default()
    }

    fn path(&mut self, _now: f64) -> Option<Path> {
        if self.handed_out && !self.repeat {
            return None;
        }
        let skip = usize::from(!self.handed_out);
        self.handed_out = true;
        let path = Path::from_waypoints(self.waypoints.iter().skip(skip).copied(), self.speed);
        (!path.is_empty()).then_some(path)
    }

    fn next_path_available(&mut self, now: f64) -> f64 {
        if self.handed_out && !self.repeat {
            f64::INFINITY
        } else {
            now
        }
    }

    fn is_active(&self, now: f64) -> bool {
        now >= self.start_time
    }
}

/// Random waypoint movement inside a rectangular world
#[derive(Debug, Clone)]
pub struct RandomWaypoint {
    rng: ChaCha8Rng,
    world: (f64, f64),
    speed: (f64, f64),
    wait: (f64, f64),
}

impl RandomWaypoint {
    pub const KIND: &'static str = "random-waypoint";

    pub fn new(seed: u64, world: (f64, f64), speed: (f64, f64), wait: (f64, f64)) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            world,
            speed,
            wait,
        }
    }

    fn random_coord(&mut self) -> Coord {
        Coord::new(
            self.rng.random_range(0.0..=self.world.0),
            self.rng.random_range(0.0..=self.world.1),
        )
    }
}

impl MobilityModel for RandomWaypoint {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn initial_location(&mut self) -> Coord {
        self.random_coord()
    }

    fn path(&mut self, _now: f64) -> Option<Path> {
        let speed = self.rng.random_range(self.speed.0..=self.speed.1);
        let mut path = Path::new(speed);
        path.add_waypoint(self.random_coord());
        Some(path)
    }

    fn next_path_available(&mut self, now: f64) -> f64 {
        now + self.rng.random_range(self.wait.0..=self.wait.1)
    }
}

/// Movement model selection as it appears in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum MovementConfig {
    /// Member `i` of a group is placed at `locations[i % len]`
    Stationary { locations: Vec<Coord> },
    Scripted {
        waypoints: Vec<Coord>,
        speed: f64,
        #[serde(default)]
        repeat: bool,
        #[serde(default)]
        start_time: f64,
    },
    RandomWaypoint {
        min_speed: f64,
        max_speed: f64,
        #[serde(default)]
        min_wait: f64,
        #[serde(default)]
        max_wait: f64,
    },
}

impl MovementConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            MovementConfig::Stationary { .. } => Stationary::KIND,
            MovementConfig::Scripted { .. } => Scripted::KIND,
            MovementConfig::RandomWaypoint { .. } => RandomWaypoint::KIND,
        }
    }

    pub fn validate(&self, group: &str) -> Result<(), ConfigError> {
        let field = |name: &str| format!("groups.{group}.movement.{name}");
        let range = |name: &str, lo: f64, hi: f64| {
            if lo.is_finite() && hi.is_finite() && lo >= 0.0 && lo <= hi {
                Ok(())
            } else {
                Err(ConfigError::invalid_value(
                    field(name),
                    format!("[{lo}, {hi}] is not a non-negative range"),
                ))
            }
        };
        match self {
            MovementConfig::Stationary { locations } => {
                if locations.is_empty() {
                    return Err(ConfigError::invalid_value(field("locations"), "must not be empty"));
                }
            }
            MovementConfig::Scripted {
                waypoints, speed, ..
            } => {
                if waypoints.is_empty() {
                    return Err(ConfigError::invalid_value(field("waypoints"), "must not be empty"));
                }
                range("speed", *speed, *speed)?;
            }
            MovementConfig::RandomWaypoint {
                min_speed,
                max_speed,
                min_wait,
                max_wait,
            } => {
                range("speed", *min_speed, *max_speed)?;
                range("wait", *min_wait, *max_wait)?;
            }
        }
        Ok(())
    }

    /// Build the model for one member of a group
    ///
    /// `seed` should already be specific to the host so that every host
    /// draws from its own stream.
    pub fn clone_for_host(&self, member: usize, seed: u64, world: (f64, f64)) -> Box<dyn MobilityModel> {
        match self {
            MovementConfig::Stationary { locations } => {
                let location = locations
                    .get(member % locations.len().max(1))
                    .copied()
                    .unwrap_or_default();
                Box::new(Stationary::new(location))
            }
            MovementConfig::Scripted {
                waypoints,
                speed,
                repeat,
                start_time,
            } => {
                let mut model = Scripted::new(waypoints.clone(), *speed).starting_at(*start_time);
                if *repeat {
                    model = model.repeating();
                }
                Box::new(model)
            }
            MovementConfig::RandomWaypoint {
                min_speed,
                max_speed,
                min_wait,
                max_wait,
            } => Box::new(RandomWaypoint::new(
                seed,
                world,
                (*min_speed, *max_speed),
                (*min_wait, *max_wait),
            )),
        }
    }
}

/// Per-host seed derived from the run seed
pub fn host_seed(run_seed: u64, address: u32) -> u64 {
    // SplitMix64 finaliser over the pair
    let mut z = run_seed ^ (u64::from(address).wrapping_add(1)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
