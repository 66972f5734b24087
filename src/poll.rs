//! Bounded polling helper
//!
//! Copyright 2019 Ryan Kurte

use embedded_hal::blocking::delay::DelayMs;

/// Retry budget for waiting on a device condition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poll {
    /// Delay between attempts in milliseconds
    pub interval_ms: u32,
    /// Maximum number of times the condition is checked
    pub max_attempts: u32,
}

impl Poll {
    pub const fn new(interval_ms: u32, max_attempts: u32) -> Self {
        Self{ interval_ms, max_attempts }
    }

    /// Check `ready` until it returns true, sleeping `interval_ms` between checks
    ///
    /// Returns `Ok(false)` if the condition never became true within the budget,
    /// errors from `ready` are returned immediately.
    pub fn until<D, E, F>(&self, delay: &mut D, mut ready: F) -> Result<bool, E>
    where
        D: DelayMs<u32>,
        F: FnMut() -> Result<bool, E>,
    {
        for attempt in 0..self.max_attempts {
            if ready()? {
                return Ok(true);
            }

            // No point sleeping after the last check
            if attempt + 1 < self.max_attempts {
                delay.delay_ms(self.interval_ms);
            }
        }

        Ok(false)
    }
}
