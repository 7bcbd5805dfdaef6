//! Wall-clock progress estimation for long training loops
//!
//! [`TimeEstimator`] remembers when a timed phase started and how many
//! iterations had already been done at that point, then extrapolates the
//! remaining time linearly from the iterations completed since.
//!
//! # Usage Example
//!
//! ```ignore
//! let mut timer = TimeEstimator::new();
//! timer.reset(start_epoch);
//!
//! for epoch in start_epoch..=epochs {
//!     train_one_epoch(..);
//!     timer.log_progress(epoch, epochs);
//!     // Epoch  12/100: Time Est.: Elapsed[3.41m], Remain[25.03m]
//! }
//! ```

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::time::Instant;

use crate::logging::{LogFacade, Logger};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Projects elapsed and remaining time of a fixed number of iterations.
///
/// `reset` needs `&mut self`, so a shared estimator must be serialized by its
/// owner. Use one estimator per timed phase.
#[derive(Debug, Clone)]
pub struct TimeEstimator<C: Clock = SystemClock, L: Logger = LogFacade> {
    clock: C,
    logger: L,
    start_time: Instant,
    count_zero: i64,
}

impl TimeEstimator {
    /// Armed at the current time with no iterations done.
    pub fn new() -> Self {
        Self::with_parts(SystemClock, LogFacade::default())
    }
}

impl Default for TimeEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock, L: Logger> TimeEstimator<C, L> {
    pub fn with_parts(clock: C, logger: L) -> Self {
        let start_time = clock.now();
        Self {
            clock,
            logger,
            start_time,
            count_zero: 0,
        }
    }

    /// Re-arms the estimator for a phase whose first iteration is `count`.
    ///
    /// Iterations before `count` are treated as done before timing started.
    pub fn reset(&mut self, count: i64) {
        self.start_time = self.clock.now();
        self.count_zero = count - 1;
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn count_zero(&self) -> i64 {
        self.count_zero
    }

    /// Returns `(elapsed, remaining)` in hours at iteration `count` of `total`.
    ///
    /// With no iterations since arming, remaining is `0.0`.
    pub fn estimate(&self, count: i64, total: i64) -> (f64, f64) {
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(self.start_time)
            .as_secs_f64();

        let done = count - self.count_zero;
        if done == 0 {
            return (elapsed / SECONDS_PER_HOUR, 0.0);
        }

        let remain = elapsed * (total - count) as f64 / done as f64;
        (elapsed / SECONDS_PER_HOUR, remain / SECONDS_PER_HOUR)
    }

    /// [`estimate`](Self::estimate) rendered with [`format_hours`].
    pub fn estimate_strings(&self, count: i64, total: i64) -> (String, String) {
        let (elapsed, remain) = self.estimate(count, total);
        (format_hours(elapsed), format_hours(remain))
    }

    /// Logs one progress line at info level.
    pub fn log_progress(&self, count: i64, total: i64) {
        let (elapsed, remain) = self.estimate_strings(count, total);
        self.logger.info(&format!(
            "Epoch {count:3}/{total:3}: Time Est.: Elapsed[{elapsed}], Remain[{remain}]"
        ));
    }
}

/// Hours above one render as `"1.50h"`, anything else as minutes, `"30.00m"`.
pub fn format_hours(hours: f64) -> String {
    if hours > 1.0 {
        format!("{hours:.2}h")
    } else {
        format!("{:.2}m", hours * 60.0)
    }
}
