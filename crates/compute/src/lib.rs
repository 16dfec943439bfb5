pub mod scheduler;
pub mod session;
pub mod stages;

pub use scheduler::{
    ComputeError, PerformanceSummary, PlotUnitId, PoolSizes, Scheduler, SchedulerSnapshot,
    StageKind, Task, TraceUnitId,
};
pub use session::RenderSession;
pub use stages::{RenderUnits, SimulatedStages, StageError, Stages};
