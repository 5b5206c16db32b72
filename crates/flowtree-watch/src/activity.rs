// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::time::Instant;

const DEFAULT_CAPACITY: usize = 50;

/// Bounded ring of recent sync events for the status surface. Timestamps are
/// monotonic offsets from loop start so snapshots stay wall-clock free.
#[derive(Debug)]
pub struct ActivityLog {
    started: Instant,
    capacity: usize,
    events: VecDeque<String>,
}

impl ActivityLog {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            started: Instant::now(),
            capacity: capacity.max(1),
            events: VecDeque::new(),
        }
    }

    pub fn record(&mut self, message: impl Into<String>) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        let at = self.started.elapsed().as_secs();
        self.events.push_back(format!("[+{at}s] {}", message.into()));
    }

    #[must_use]
    pub fn recent(&self) -> Vec<String> {
        self.events.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}
