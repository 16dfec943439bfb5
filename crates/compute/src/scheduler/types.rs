use serde::Serialize;

use super::pool::UnitCensus;
use super::task::ComputeError;

/// Number of trace and plot units in a render session.
///
/// There is always exactly one gather unit and one tonemap unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSizes {
    pub trace_units: usize,
    pub plot_units: usize,
}

impl PoolSizes {
    pub const fn new(trace_units: usize, plot_units: usize) -> Self {
        Self {
            trace_units,
            plot_units,
        }
    }

    /// Pool sizes for `parallelism` workers.
    ///
    /// Trace units are oversubscribed (three per worker) so tracing never
    /// starves; one plot pass absorbs many traces, so half a plot unit per
    /// worker is enough.
    pub fn for_parallelism(parallelism: usize) -> Self {
        Self {
            trace_units: parallelism.saturating_mul(3).max(1),
            plot_units: (parallelism / 2).max(1),
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.trace_units == 0 || self.plot_units == 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "at least one trace and one plot unit are required, got {} trace / {} plot",
                self.trace_units, self.plot_units
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of the scheduler's resource state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub trace: UnitCensus,
    pub plot: UnitCensus,
    pub gather_available: bool,
    pub tonemap_available: bool,
    /// Gathered output changed since the last tonemap.
    pub image_changed: bool,
    /// Traces completed since the last tonemap.
    pub completed_traces: u64,
}
