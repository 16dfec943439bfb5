use std::time::Instant;

use tracing::{debug, info, trace};

use crate::scheduler::task::Task;

use super::core::SchedulerState;

impl SchedulerState {
    /// Return the units used by a finished task to their next state.
    pub(crate) fn complete(&mut self, completed: Task, now: Instant) {
        match completed {
            Task::Sleep => trace!("worker woke up"),
            Task::Trace { unit } => {
                debug!(unit = unit.0, "done tracing");
                // Traced samples still need plotting before reuse
                self.trace.mark_done(unit.0);
                self.throughput.record_trace();
            }
            Task::Plot { unit, traces } => {
                debug!(unit = unit.0, released = ?traces, "done plotting");
                for trace_unit in traces {
                    self.trace.release(trace_unit.0);
                }
                // The plot now needs gathering before reuse
                self.plot.mark_done(unit.0);
            }
            Task::Gather { plots } => {
                debug!(released = ?plots, "done gathering");
                for plot_unit in plots {
                    self.plot.release(plot_unit.0);
                }
                self.gather_available = true;
                self.image_changed = true;
            }
            Task::Tonemap => {
                self.gather_available = true;
                self.tonemap_available = true;
                self.image_changed = false;

                let summary = self.throughput.record_tonemap(now);
                info!(
                    samples = summary.samples,
                    latest = summary.latest,
                    "performance: {:.2} +- {:.2} traces/sec",
                    summary.mean,
                    summary.std_dev
                );
            }
        }
    }
}
