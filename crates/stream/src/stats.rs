use std::collections::VecDeque;
use std::time::Duration;
use terrastream_common::ChunkCoord;

use crate::scheduler::TickStats;

/// Changes made by one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New records, fresh or from the pool.
    pub created: usize,
    /// Subset of `created` popped from the pool.
    pub reused: usize,
    pub retired: usize,
    /// Retired records released because their pool bucket was full.
    pub discarded: usize,
    pub regenerated: usize,
    /// Placement-only updates; no generation.
    pub repositioned: usize,
    /// Not-ready records queued again after an earlier failure.
    pub requeued: usize,
    /// Pending tasks dropped because their chunk was retired or regenerated.
    pub cancelled: usize,
}

impl ReconcileReport {
    /// Create, retire and regenerate actions. Placement fixes are excluded.
    pub fn actions(&self) -> usize {
        self.created + self.retired + self.regenerated
    }
}

/// Per-update statistics for instrumentation.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Origin translation applied this update, if any.
    pub shifted: Option<ChunkCoord>,
    pub observer_chunk: ChunkCoord,
    pub reconcile: ReconcileReport,
    pub tick: TickStats,
    pub loaded: usize,
    pub ready: usize,
    pub pooled: usize,
    pub elapsed: Duration,
}

/// Rolling window over the most recent update durations.
#[derive(Debug)]
pub struct FrameTimer {
    window: VecDeque<Duration>,
    capacity: usize,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push one sample, evicting the oldest once the window is full.
    pub fn record(&mut self, dt: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(dt);
    }

    pub fn last(&self) -> Option<Duration> {
        self.window.back().copied()
    }

    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().sum::<Duration>() / self.window.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.window.iter().copied().min().unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.window.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
