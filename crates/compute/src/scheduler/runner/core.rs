use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lumen_core::SchedulerConfig;
use tracing::info;

use crate::scheduler::metrics::{PerformanceSummary, ThroughputTracker};
use crate::scheduler::pool::UnitPool;
use crate::scheduler::task::{ComputeError, Task};
use crate::scheduler::types::{PoolSizes, SchedulerSnapshot};

/// All mutable scheduling state. Only ever touched under the scheduler lock.
#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(super) trace: UnitPool,
    pub(super) plot: UnitPool,
    pub(super) gather_available: bool,
    pub(super) tonemap_available: bool,
    /// Gathered output changed since the last tonemap.
    pub(super) image_changed: bool,
    pub(super) tonemap_interval: Duration,
    pub(super) throughput: ThroughputTracker,
}

impl SchedulerState {
    fn new(sizes: PoolSizes, config: &SchedulerConfig, now: Instant) -> Self {
        Self {
            trace: UnitPool::new("trace", sizes.trace_units),
            plot: UnitPool::new("plot", sizes.plot_units),
            gather_available: true,
            tonemap_available: true,
            image_changed: false,
            tonemap_interval: config.tonemap_interval(),
            throughput: ThroughputTracker::new(config.performance_history, now),
        }
    }

    pub(super) fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            trace: self.trace.census(),
            plot: self.plot.census(),
            gather_available: self.gather_available,
            tonemap_available: self.tonemap_available,
            image_changed: self.image_changed,
            completed_traces: self.throughput.completed_traces(),
        }
    }
}

/// The render scheduler.
///
/// Workers call [`request_task`](Scheduler::request_task) in a loop, passing
/// back the task they just finished. Every call runs as one critical
/// section: the finished task's units are retired, then the next task is
/// chosen from a consistent view of the pools.
#[derive(Debug)]
pub struct Scheduler {
    pub(super) sizes: PoolSizes,
    pub(super) config: SchedulerConfig,
    pub(super) state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Create a scheduler with every unit available.
    pub fn new(sizes: PoolSizes, config: &SchedulerConfig) -> Result<Self, ComputeError> {
        sizes.validate()?;
        if config.tonemap_interval_secs == 0 {
            return Err(ComputeError::InvalidConfig(
                "tonemap interval must be at least one second".into(),
            ));
        }
        if config.performance_history == 0 {
            return Err(ComputeError::InvalidConfig(
                "performance history must hold at least one sample".into(),
            ));
        }

        info!(
            "Scheduler created with {} trace units, {} plot units, tonemap every {}s",
            sizes.trace_units, sizes.plot_units, config.tonemap_interval_secs
        );

        Ok(Self {
            sizes,
            config: config.clone(),
            state: Mutex::new(SchedulerState::new(sizes, config, Instant::now())),
        })
    }

    /// Retire `completed` and return the next task for the calling worker.
    ///
    /// Pass [`Task::Sleep`] when there is no previous task.
    pub fn request_task(&self, completed: Task) -> Task {
        self.lock_state().next_task(completed, Instant::now())
    }

    /// Retire `completed` without asking for more work.
    pub fn complete(&self, completed: Task) {
        self.lock_state().complete(completed, Instant::now());
    }

    /// Get a snapshot of the current pool state.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.lock_state().snapshot()
    }

    /// Throughput summary from the most recent tonemap.
    pub fn performance(&self) -> Option<PerformanceSummary> {
        self.lock_state().throughput.latest()
    }

    pub fn pool_sizes(&self) -> PoolSizes {
        self.sizes
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Scheduling never panics mid-update, so a poisoned lock still guards
    /// consistent state.
    pub(super) fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
