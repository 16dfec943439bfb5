use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lumen_core::Config;
use tracing::{debug, info, warn};

use crate::scheduler::{ComputeError, PoolSizes, Scheduler, Task};
use crate::stages::{RenderUnits, StageError, Stages};

/// A render in progress: the scheduler, the units it hands out, and the
/// stages that run on them.
pub struct RenderSession<S: Stages> {
    stages: S,
    units: RenderUnits<S>,
    scheduler: Scheduler,
    workers: usize,
    sleep_backoff: Duration,
}

impl<S: Stages> RenderSession<S> {
    /// Size the pools for the configured worker count and allocate every unit.
    pub fn new(config: &Config, stages: S) -> Result<Self, ComputeError> {
        let workers = config.workers.resolved_threads();
        let sizes = PoolSizes::for_parallelism(workers);
        let scheduler = Scheduler::new(sizes, &config.scheduler)?;

        let seed = config.scheduler.seed.unwrap_or_else(rand::random);
        debug!(seed, "seeding trace units");
        let units = RenderUnits::build(&stages, sizes, seed)?;

        Ok(Self {
            stages,
            units,
            scheduler,
            workers,
            sleep_backoff: config.workers.sleep_backoff(),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn units(&self) -> &RenderUnits<S> {
        &self.units
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run one task against the units it names.
    pub fn execute(&self, task: &Task) -> Result<(), StageError> {
        match task {
            Task::Sleep => Ok(()),
            Task::Trace { unit } => {
                let mut unit = self.units.trace(*unit)?;
                self.stages.trace(&mut unit)
            }
            Task::Plot { unit, traces } => {
                let mut plot = self.units.plot(*unit)?;
                let guards = traces
                    .iter()
                    .map(|id| self.units.trace(*id))
                    .collect::<Result<Vec<_>, _>>()?;
                let traces: Vec<&S::TraceUnit> = guards.iter().map(|g| &**g).collect();
                self.stages.plot(&mut plot, &traces)
            }
            Task::Gather { plots } => {
                let mut gather = self.units.gather();
                let mut guards = plots
                    .iter()
                    .map(|id| self.units.plot(*id))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut plots: Vec<&mut S::PlotUnit> =
                    guards.iter_mut().map(|g| &mut **g).collect();
                self.stages.gather(&mut gather, &mut plots)
            }
            Task::Tonemap => {
                let gathered = self.units.gather();
                let mut tonemap = self.units.tonemap();
                self.stages.tonemap(&mut tonemap, &gathered)
            }
        }
    }

    /// Run the worker pool until `shutdown` is set.
    ///
    /// Each worker loops: request a task, run it, hand it back with the
    /// next request. Workers retire their last task before exiting, so
    /// every unit is idle again when this returns.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<(), ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("render-worker-{i}"))
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;

        let sizes = self.scheduler.pool_sizes();
        info!(
            "Render session starting with {} workers, {} trace units, {} plot units",
            self.workers, sizes.trace_units, sizes.plot_units
        );

        pool.scope(|scope| {
            for worker in 0..self.workers {
                scope.spawn(move |_| self.worker_loop(worker, shutdown));
            }
        });

        info!("Render session stopped");
        Ok(())
    }

    fn worker_loop(&self, worker: usize, shutdown: &AtomicBool) {
        let mut completed = Task::Sleep;
        while !shutdown.load(Ordering::Relaxed) {
            let task = self.scheduler.request_task(completed);
            if task.is_sleep() {
                std::thread::sleep(self.sleep_backoff);
            } else if let Err(e) = self.execute(&task) {
                // Still reported complete below so its units recycle
                warn!(worker, stage = %task.kind(), error = %e, "stage failed");
            }
            completed = task;
        }
        self.scheduler.complete(completed);
        debug!(worker, "worker exited");
    }

    /// Read the most recently tonemapped image.
    pub fn with_image<R>(&self, f: impl FnOnce(&S::TonemapUnit) -> R) -> R {
        f(&self.units.tonemap())
    }
}
