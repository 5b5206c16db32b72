// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

const BACKOFF_CEILING: Duration = Duration::from_secs(16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
}

pub trait BackoffPolicy {
    /// Delay before retry number `attempt` (1-based count of failures so
    /// far).
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as u32;
        self.base_backoff
            .saturating_mul(2_u32.saturating_pow(exp))
            .min(BACKOFF_CEILING.max(self.base_backoff))
    }
}
