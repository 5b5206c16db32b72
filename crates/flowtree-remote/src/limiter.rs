// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const RATE_LIMIT_PER_MINUTE: usize = 180;
pub const RATE_LIMIT_PER_10MIN: usize = 1200;

const MINUTE: Duration = Duration::from_secs(60);
const TEN_MINUTES: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub per_minute: usize,
    pub per_ten_minutes: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: RATE_LIMIT_PER_MINUTE,
            per_ten_minutes: RATE_LIMIT_PER_10MIN,
        }
    }
}

/// Sliding-window request limiter over two windows: a short one against
/// sustained hot loops and a long one against slow runaways.
#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimits,
    timestamps: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            timestamps: Mutex::new(Vec::new()),
        }
    }

    /// Record and allow the request, or refuse without recording.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let Ok(mut times) = self.timestamps.lock() else {
            return false;
        };
        times.retain(|t| now.duration_since(*t) < TEN_MINUTES);
        let last_minute = times
            .iter()
            .filter(|t| now.duration_since(**t) < MINUTE)
            .count();
        if last_minute >= self.limits.per_minute || times.len() >= self.limits.per_ten_minutes {
            return false;
        }
        times.push(now);
        true
    }

    /// How long until the next request could be admitted; zero when a slot
    /// is open right now.
    #[must_use]
    pub fn next_allowed_in(&self) -> Duration {
        self.next_allowed_in_at(Instant::now())
    }

    fn next_allowed_in_at(&self, now: Instant) -> Duration {
        let Ok(times) = self.timestamps.lock() else {
            return Duration::ZERO;
        };
        let in_ten: Vec<&Instant> = times
            .iter()
            .filter(|t| now.duration_since(**t) < TEN_MINUTES)
            .collect();
        let in_minute: Vec<&Instant> = in_ten
            .iter()
            .copied()
            .filter(|t| now.duration_since(**t) < MINUTE)
            .collect();

        let mut wait = Duration::ZERO;
        if in_minute.len() >= self.limits.per_minute {
            if let Some(oldest) = in_minute.first() {
                wait = wait.max(MINUTE.saturating_sub(now.duration_since(**oldest)));
            }
        }
        if in_ten.len() >= self.limits.per_ten_minutes {
            if let Some(oldest) = in_ten.first() {
                wait = wait.max(TEN_MINUTES.saturating_sub(now.duration_since(**oldest)));
            }
        }
        wait
    }

    /// (requests in the last minute, requests in the last ten minutes).
    #[must_use]
    pub fn window_counts(&self) -> (usize, usize) {
        let now = Instant::now();
        let Ok(times) = self.timestamps.lock() else {
            return (0, 0);
        };
        let ten = times
            .iter()
            .filter(|t| now.duration_since(**t) < TEN_MINUTES)
            .count();
        let minute = times
            .iter()
            .filter(|t| now.duration_since(**t) < MINUTE)
            .count();
        (minute, ten)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}
