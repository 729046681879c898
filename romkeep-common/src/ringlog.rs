//! Bounded ring buffer of recent log lines.
//!
//! Backs the sync status projection: the scheduler pushes one line per
//! notable event and the status endpoint returns a snapshot. Old lines
//! are discarded once the capacity is reached.

use chrono::Utc;
use std::collections::VecDeque;

/// Default number of retained lines
pub const DEFAULT_CAPACITY: usize = 200;

/// Bounded FIFO of timestamped log lines
#[derive(Debug)]
pub struct RingLog {
    capacity: usize,
    lines: VecDeque<String>,
}

impl RingLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn push(&mut self, line: impl AsRef<str>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines
            .push_back(format!("{} {}", Utc::now().format("%H:%M:%S"), line.as_ref()));
    }

    /// Snapshot of retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for RingLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
