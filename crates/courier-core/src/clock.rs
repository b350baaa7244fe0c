//! Virtual time for a simulation run
//!
//! The clock is owned by the scheduler and passed by reference; nothing in
//! the engine reads wall-clock time.

use crate::error::ClockError;

/// Run-scoped simulation clock
///
/// Time is measured in seconds and only ever moves forward.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    time: f64,
}

impl SimClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self { time: 0.0 }
    }

    /// Current simulation time in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Current simulation time rounded down to whole seconds
    pub fn int_time(&self) -> u64 {
        self.time.max(0.0).floor() as u64
    }

    /// Advance the clock by `increment` seconds, returning the new time
    ///
    /// # Errors
    ///
    /// `ClockError::InvalidIncrement` if the increment is negative or not finite.
    pub fn advance(&mut self, increment: f64) -> Result<f64, ClockError> {
        if !increment.is_finite() || increment < 0.0 {
            return Err(ClockError::InvalidIncrement(increment));
        }
        self.time += increment;
        Ok(self.time)
    }

    /// Move the clock to an absolute time
    ///
    /// # Errors
    ///
    /// `ClockError::Backwards` if `target` is earlier than the current time.
    pub fn advance_to(&mut self, target: f64) -> Result<(), ClockError> {
        if !target.is_finite() || target < self.time {
            return Err(ClockError::Backwards {
                current: self.time,
                target,
            });
        }
        self.time = target;
        Ok(())
    }

    /// Reset to time zero at the start of a run
    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}
