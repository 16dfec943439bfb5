use std::fmt;

use serde::Serialize;

/// Error type for the compute crate.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),
    #[error("{stage} stage failed: {message}")]
    Stage { stage: StageKind, message: String },
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Index of a trace unit in the trace pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TraceUnitId(pub usize);

/// Index of a plot unit in the plot pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlotUnitId(pub usize);

/// The five kinds of work the scheduler hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    Trace,
    Plot,
    Gather,
    Tonemap,
    Sleep,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Trace => "trace",
            StageKind::Plot => "plot",
            StageKind::Gather => "gather",
            StageKind::Tonemap => "tonemap",
            StageKind::Sleep => "sleep",
        };
        f.write_str(name)
    }
}

/// One assignment handed to a worker.
///
/// The units named in a task are owned exclusively by the worker that
/// received it until the task is passed back to
/// [`Scheduler::request_task`](super::Scheduler::request_task).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum Task {
    /// Nothing to do; back off briefly and ask again.
    #[default]
    Sleep,
    /// Trace new samples into `unit`.
    Trace { unit: TraceUnitId },
    /// Splat the samples of `traces` into plot `unit`.
    Plot {
        unit: PlotUnitId,
        traces: Vec<TraceUnitId>,
    },
    /// Merge `plots` into the gather unit.
    Gather { plots: Vec<PlotUnitId> },
    /// Convert the gathered image into a displayable one.
    Tonemap,
}

impl Task {
    pub fn kind(&self) -> StageKind {
        match self {
            Task::Sleep => StageKind::Sleep,
            Task::Trace { .. } => StageKind::Trace,
            Task::Plot { .. } => StageKind::Plot,
            Task::Gather { .. } => StageKind::Gather,
            Task::Tonemap => StageKind::Tonemap,
        }
    }

    pub fn is_sleep(&self) -> bool {
        matches!(self, Task::Sleep)
    }
}
