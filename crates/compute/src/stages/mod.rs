//! Stage contract and the working memory of every unit.
//!
//! The scheduler only deals in unit indices. The memory behind those
//! indices lives in [`RenderUnits`], built once per session from a
//! [`Stages`] implementation that also performs the numeric work.

pub mod simulated;

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::scheduler::{ComputeError, PlotUnitId, PoolSizes, StageKind, TraceUnitId};

pub use simulated::SimulatedStages;

/// Failure reported by a stage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct StageError(pub String);

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The four render stages and the unit types they operate on.
///
/// A unit handed to one of these methods is accessed by exactly one
/// worker for the duration of the call.
pub trait Stages: Send + Sync {
    type TraceUnit: Send;
    type PlotUnit: Send;
    type GatherUnit: Send;
    type TonemapUnit: Send;

    /// Build a trace unit whose random stream starts from `seed`.
    fn trace_unit(&self, seed: u64) -> Result<Self::TraceUnit, StageError>;

    /// Draw the seed for the next trace unit from `unit`'s stream.
    fn next_seed(&self, unit: &mut Self::TraceUnit) -> u64;

    fn plot_unit(&self) -> Result<Self::PlotUnit, StageError>;

    fn gather_unit(&self) -> Result<Self::GatherUnit, StageError>;

    fn tonemap_unit(&self) -> Result<Self::TonemapUnit, StageError>;

    /// Produce a fresh batch of samples in `unit`.
    fn trace(&self, unit: &mut Self::TraceUnit) -> Result<(), StageError>;

    /// Accumulate the samples of `traces` into `unit`.
    fn plot(
        &self,
        unit: &mut Self::PlotUnit,
        traces: &[&Self::TraceUnit],
    ) -> Result<(), StageError>;

    /// Merge `plots` into `unit`, leaving the plots empty for reuse.
    fn gather(
        &self,
        unit: &mut Self::GatherUnit,
        plots: &mut [&mut Self::PlotUnit],
    ) -> Result<(), StageError>;

    /// Turn the gathered result into a displayable image.
    fn tonemap(
        &self,
        unit: &mut Self::TonemapUnit,
        gathered: &Self::GatherUnit,
    ) -> Result<(), StageError>;
}

/// Working memory for every unit of a session.
///
/// Each unit sits behind its own mutex. The scheduler never hands the same
/// unit to two workers, so these locks are uncontended.
pub struct RenderUnits<S: Stages> {
    trace: Vec<Mutex<S::TraceUnit>>,
    plot: Vec<Mutex<S::PlotUnit>>,
    gather: Mutex<S::GatherUnit>,
    tonemap: Mutex<S::TonemapUnit>,
}

impl<S: Stages> RenderUnits<S> {
    /// Build all units. Each trace unit is seeded from the stream of the
    /// previous one so no two units draw correlated samples.
    pub fn build(stages: &S, sizes: PoolSizes, seed: u64) -> Result<Self, ComputeError> {
        let mut trace = Vec::with_capacity(sizes.trace_units);
        let mut seed = seed;
        for _ in 0..sizes.trace_units {
            let mut unit = stages
                .trace_unit(seed)
                .map_err(|e| construction_error(StageKind::Trace, e))?;
            seed = stages.next_seed(&mut unit);
            trace.push(Mutex::new(unit));
        }

        let plot = (0..sizes.plot_units)
            .map(|_| stages.plot_unit().map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| construction_error(StageKind::Plot, e))?;

        let gather = stages
            .gather_unit()
            .map_err(|e| construction_error(StageKind::Gather, e))?;
        let tonemap = stages
            .tonemap_unit()
            .map_err(|e| construction_error(StageKind::Tonemap, e))?;

        debug!(
            trace_units = trace.len(),
            plot_units = plot.len(),
            "render units allocated"
        );

        Ok(Self {
            trace,
            plot,
            gather: Mutex::new(gather),
            tonemap: Mutex::new(tonemap),
        })
    }

    pub fn trace(&self, id: TraceUnitId) -> Result<MutexGuard<'_, S::TraceUnit>, StageError> {
        self.trace
            .get(id.0)
            .map(lock)
            .ok_or_else(|| StageError(format!("unknown trace unit {}", id.0)))
    }

    pub fn plot(&self, id: PlotUnitId) -> Result<MutexGuard<'_, S::PlotUnit>, StageError> {
        self.plot
            .get(id.0)
            .map(lock)
            .ok_or_else(|| StageError(format!("unknown plot unit {}", id.0)))
    }

    pub fn gather(&self) -> MutexGuard<'_, S::GatherUnit> {
        lock(&self.gather)
    }

    pub fn tonemap(&self) -> MutexGuard<'_, S::TonemapUnit> {
        lock(&self.tonemap)
    }

    pub fn sizes(&self) -> PoolSizes {
        PoolSizes {
            trace_units: self.trace.len(),
            plot_units: self.plot.len(),
        }
    }
}

/// A stage that panicked leaves its unit's data stale but still usable;
/// the next pass over the unit overwrites it.
fn lock<T>(unit: &Mutex<T>) -> MutexGuard<'_, T> {
    unit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn construction_error(stage: StageKind, err: StageError) -> ComputeError {
    ComputeError::Stage {
        stage,
        message: format!("unit construction failed: {err}"),
    }
}
