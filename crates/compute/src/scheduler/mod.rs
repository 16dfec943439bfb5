//! Render task scheduler.
//!
//! The scheduler owns the state of every trace, plot, gather and tonemap
//! unit and decides which stage an idle worker runs next. Workers hand
//! back each finished [`Task`] on their next request; that single call is
//! the only synchronization point between workers.

pub mod metrics;
pub mod pool;
pub mod runner;
pub mod task;
pub mod types;

pub use metrics::{PerformanceSummary, RingBuffer, ThroughputTracker};
pub use pool::{UnitCensus, UnitPool, UnitState};
pub use runner::Scheduler;
pub use task::{ComputeError, PlotUnitId, StageKind, Task, TraceUnitId};
pub use types::{PoolSizes, SchedulerSnapshot};
