use std::time::Instant;

use tracing::{debug, trace};

use crate::scheduler::task::{PlotUnitId, Task, TraceUnitId};

use super::core::SchedulerState;

impl SchedulerState {
    /// Retire `completed`, then pick the next task.
    pub(crate) fn next_task(&mut self, completed: Task, now: Instant) -> Task {
        self.complete(completed, now);

        if let Some(task) = self.tonemap_due_task(now) {
            return task;
        }
        self.priority_task()
    }

    /// Once the tonemap interval has passed, prefer work that produces a
    /// fresh displayable image. Falls through when neither is possible.
    fn tonemap_due_task(&mut self, now: Instant) -> Option<Task> {
        if self.throughput.elapsed(now) <= self.tonemap_interval {
            return None;
        }

        if self.image_changed {
            // Tonemapping reads the gather unit, so both must be idle
            if self.gather_available && self.tonemap_available {
                return Some(self.tonemap_task());
            }
        } else if self.gather_available && self.plot.done_len() > 0 {
            // Nothing new to tonemap yet; gather first
            return Some(self.gather_task());
        }
        None
    }

    fn priority_task(&mut self) -> Task {
        // A large trace backlog is plotted first so the units recycle soon
        if self.trace.done_len() > self.trace.len() / 2 {
            if let Some(unit) = self.plot.take_available() {
                return self.plot_task(unit);
            }
        }

        if let Some(unit) = self.trace.take_available() {
            return Task::Trace {
                unit: TraceUnitId(unit),
            };
        }

        if self.trace.done_len() > 0 {
            if let Some(unit) = self.plot.take_available() {
                return self.plot_task(unit);
            }
        }

        if self.gather_available && self.plot.done_len() > 0 {
            return self.gather_task();
        }

        trace!("all units busy, worker sleeps");
        Task::Sleep
    }

    /// Plot around half of the done trace units, keeping batches small.
    fn plot_task(&mut self, unit: usize) -> Task {
        let done = self.trace.done_len();
        let n = done.min((done / 2).max(1));
        let traces: Vec<TraceUnitId> = self
            .trace
            .take_done(n)
            .into_iter()
            .map(TraceUnitId)
            .collect();

        debug!(unit, traces = traces.len(), "issuing plot task");
        Task::Plot {
            unit: PlotUnitId(unit),
            traces,
        }
    }

    /// Gather every done plot unit.
    fn gather_task(&mut self) -> Task {
        self.gather_available = false;
        let plots: Vec<PlotUnitId> = self
            .plot
            .take_all_done()
            .into_iter()
            .map(PlotUnitId)
            .collect();

        debug!(plots = plots.len(), "issuing gather task");
        Task::Gather { plots }
    }

    fn tonemap_task(&mut self) -> Task {
        // The gather unit must not change while it is being tonemapped
        self.gather_available = false;
        self.tonemap_available = false;

        debug!("issuing tonemap task");
        Task::Tonemap
    }
}
