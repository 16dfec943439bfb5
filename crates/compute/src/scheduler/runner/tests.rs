#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use lumen_core::SchedulerConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::scheduler::pool::UnitCensus;
    use crate::scheduler::runner::Scheduler;
    use crate::scheduler::task::{ComputeError, PlotUnitId, StageKind, Task, TraceUnitId};
    use crate::scheduler::types::PoolSizes;

    fn scheduler(trace_units: usize, plot_units: usize) -> Scheduler {
        Scheduler::new(
            PoolSizes::new(trace_units, plot_units),
            &SchedulerConfig::default(),
        )
        .unwrap()
    }

    fn census(available: usize, in_flight: usize, done: usize) -> UnitCensus {
        UnitCensus {
            available,
            in_flight,
            done,
        }
    }

    /// Request a task as if the clock read `now`.
    fn request_at(scheduler: &Scheduler, completed: Task, now: Instant) -> Task {
        scheduler.lock_state().next_task(completed, now)
    }

    /// A moment past the tonemap interval.
    fn after_interval(scheduler: &Scheduler) -> Instant {
        scheduler.lock_state().throughput.last_tonemap() + Duration::from_secs(31)
    }

    fn trace_unit(task: &Task) -> TraceUnitId {
        match task {
            Task::Trace { unit } => *unit,
            other => panic!("expected trace task, got {other:?}"),
        }
    }

    #[test]
    fn scheduler_creation() {
        let s = scheduler(8, 2);
        let snap = s.snapshot();
        assert_eq!(snap.trace, census(8, 0, 0));
        assert_eq!(snap.plot, census(2, 0, 0));
        assert!(snap.gather_available);
        assert!(snap.tonemap_available);
        assert!(!snap.image_changed);
        assert_eq!(snap.completed_traces, 0);
        assert!(s.performance().is_none());
        assert_eq!(s.pool_sizes(), PoolSizes::new(8, 2));
    }

    #[test]
    fn construction_refuses_empty_pools() {
        let result = Scheduler::new(PoolSizes::new(4, 0), &SchedulerConfig::default());
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn construction_refuses_zero_interval() {
        let config = SchedulerConfig {
            tonemap_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        let result = Scheduler::new(PoolSizes::for_parallelism(2), &config);
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn fresh_pool_hands_out_every_trace_unit_then_sleeps() {
        let s = scheduler(8, 2);

        let mut seen = HashSet::new();
        for _ in 0..8 {
            let task = s.request_task(Task::Sleep);
            assert!(seen.insert(trace_unit(&task)), "trace unit handed out twice");
        }
        assert_eq!(seen.len(), 8);

        assert_eq!(s.request_task(Task::Sleep), Task::Sleep);
        assert_eq!(s.snapshot().trace, census(0, 8, 0));
    }

    #[test]
    fn trace_backlog_is_half_drained_by_plot() {
        let s = scheduler(8, 2);
        let traces: Vec<Task> = (0..8).map(|_| s.request_task(Task::Sleep)).collect();

        let now = Instant::now();
        {
            let mut state = s.lock_state();
            for task in traces.iter().take(5) {
                state.complete(task.clone(), now);
            }
        }

        match s.request_task(Task::Sleep) {
            Task::Plot { traces: consumed, .. } => {
                assert_eq!(consumed.len(), 2);
                // Oldest done units are plotted first
                assert_eq!(consumed, vec![trace_unit(&traces[0]), trace_unit(&traces[1])]);
            }
            other => panic!("expected plot task, got {other:?}"),
        }

        let snap = s.snapshot();
        assert_eq!(snap.trace.done, 3);
        assert_eq!(snap.trace.in_flight, 5);
        assert_eq!(snap.plot.in_flight, 1);
        assert_eq!(snap.completed_traces, 5);
    }

    #[test]
    fn backlog_over_half_prefers_plot_over_trace() {
        let s = scheduler(4, 1);
        let t0 = s.request_task(Task::Sleep);
        let t1 = s.request_task(Task::Sleep);
        let t2 = s.request_task(Task::Sleep);

        // Two done out of four is not more than half: keep tracing
        let now = Instant::now();
        s.lock_state().complete(t0, now);
        let next = request_at(&s, t1, now);
        assert_eq!(next.kind(), StageKind::Trace);

        // Three done out of four
        let next = request_at(&s, t2, now);
        assert_eq!(next.kind(), StageKind::Plot);
    }

    #[test]
    fn plot_when_no_trace_unit_is_available() {
        let s = scheduler(2, 1);
        let t0 = s.request_task(Task::Sleep);
        let _t1 = s.request_task(Task::Sleep);

        // One of two done is not a backlog, but nothing is left to trace
        let task = s.request_task(t0.clone());
        assert_eq!(
            task,
            Task::Plot {
                unit: PlotUnitId(0),
                traces: vec![trace_unit(&t0)],
            }
        );
    }

    #[test]
    fn plot_completion_returns_exactly_its_units() {
        let s = scheduler(6, 1);
        let traces: Vec<Task> = (0..6).map(|_| s.request_task(Task::Sleep)).collect();
        let now = Instant::now();
        {
            let mut state = s.lock_state();
            for task in &traces {
                state.complete(task.clone(), now);
            }
        }

        let plot = s.request_task(Task::Sleep);
        let k = match &plot {
            Task::Plot { traces, .. } => traces.len(),
            other => panic!("expected plot task, got {other:?}"),
        };
        assert_eq!(k, 3);

        s.complete(plot);
        let snap = s.snapshot();
        assert_eq!(snap.trace, census(3, 0, 3));
        assert_eq!(snap.plot, census(0, 0, 1));
    }

    #[test]
    fn gather_drains_every_done_plot() {
        let s = scheduler(1, 2);
        let now = Instant::now();

        // Produce two done plots by hand
        {
            let mut state = s.lock_state();
            for _ in 0..2 {
                let t = state.next_task(Task::Sleep, now);
                let p = state.next_task(t, now);
                assert_eq!(p.kind(), StageKind::Plot);
                state.complete(p, now);
            }
        }

        // Trace unit is free again, so tracing wins over gathering
        let t = s.request_task(Task::Sleep);
        assert_eq!(t.kind(), StageKind::Trace);

        let gather = s.request_task(Task::Sleep);
        match &gather {
            Task::Gather { plots } => assert_eq!(plots, &vec![PlotUnitId(0), PlotUnitId(1)]),
            other => panic!("expected gather task, got {other:?}"),
        }
        assert!(!s.snapshot().gather_available);

        s.complete(gather);
        let snap = s.snapshot();
        assert!(snap.gather_available);
        assert!(snap.image_changed);
        assert_eq!(snap.plot, census(2, 0, 0));
    }

    #[test]
    fn due_tonemap_is_issued_when_image_changed() {
        let s = scheduler(8, 2);
        s.lock_state().image_changed = true;

        let now = after_interval(&s);
        assert_eq!(request_at(&s, Task::Sleep, now), Task::Tonemap);

        let snap = s.snapshot();
        assert!(!snap.gather_available);
        assert!(!snap.tonemap_available);

        // While tonemapping, ordinary work continues
        assert_eq!(request_at(&s, Task::Sleep, now).kind(), StageKind::Trace);
        assert!(!s.snapshot().gather_available);

        s.complete(Task::Tonemap);
        let snap = s.snapshot();
        assert!(snap.gather_available);
        assert!(snap.tonemap_available);
        assert!(!snap.image_changed);
        assert!(s.performance().is_some());
    }

    #[test]
    fn due_tonemap_without_new_image_gathers_first() {
        let s = scheduler(1, 1);
        let now = Instant::now();
        {
            let mut state = s.lock_state();
            let t = state.next_task(Task::Sleep, now);
            let p = state.next_task(t, now);
            state.complete(p, now);
        }

        let later = after_interval(&s);
        // A trace unit is available, but the interval forces a gather
        let expected = Task::Gather {
            plots: vec![PlotUnitId(0)],
        };
        assert_eq!(request_at(&s, Task::Sleep, later), expected);
    }

    #[test]
    fn due_tonemap_falls_through_when_gather_busy() {
        let s = scheduler(2, 1);
        {
            let mut state = s.lock_state();
            state.image_changed = true;
            state.gather_available = false;
        }
        let later = after_interval(&s);
        assert_eq!(request_at(&s, Task::Sleep, later).kind(), StageKind::Trace);
    }

    #[test]
    fn no_tonemap_before_interval() {
        let s = scheduler(2, 1);
        s.lock_state().image_changed = true;
        let soon = s.lock_state().throughput.last_tonemap() + Duration::from_secs(29);
        assert_eq!(request_at(&s, Task::Sleep, soon).kind(), StageKind::Trace);
    }

    #[test]
    fn tonemap_completion_records_throughput() {
        let s = scheduler(8, 1);
        let start = s.lock_state().throughput.last_tonemap();

        let traces: Vec<Task> = (0..5).map(|_| s.request_task(Task::Sleep)).collect();
        for task in traces {
            s.complete(task);
        }
        assert_eq!(s.snapshot().completed_traces, 5);

        s.lock_state().complete(Task::Tonemap, start + Duration::from_secs(4));
        let perf = s.performance().unwrap();
        assert!((perf.latest - 1.25).abs() < 1e-9);
        assert_eq!(perf.samples, 1);
        assert_eq!(s.snapshot().completed_traces, 0);
    }

    #[test]
    fn history_is_bounded() {
        let config = SchedulerConfig {
            performance_history: 512,
            ..SchedulerConfig::default()
        };
        let s = Scheduler::new(PoolSizes::for_parallelism(1), &config).unwrap();
        let mut now = Instant::now();
        for _ in 0..600 {
            now += Duration::from_secs(1);
            s.lock_state().complete(Task::Tonemap, now);
        }
        assert_eq!(s.lock_state().throughput.history().len(), 512);
        assert_eq!(s.performance().unwrap().samples, 512);
    }

    /// Drive the scheduler with randomly ordered completions and check the
    /// resource invariants after every call.
    #[test]
    fn random_completion_order_preserves_invariants() {
        let sizes = PoolSizes::for_parallelism(4);
        let s = Scheduler::new(sizes, &SchedulerConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut in_flight: Vec<Task> = Vec::new();
        let mut now = Instant::now();

        for step in 0..5_000 {
            now += Duration::from_secs(1);

            let completed = if !in_flight.is_empty() && rng.gen_bool(0.6) {
                in_flight.swap_remove(rng.gen_range(0..in_flight.len()))
            } else {
                Task::Sleep
            };

            let task = request_at(&s, completed, now);
            let snap = s.snapshot();

            if task.is_sleep() {
                assert_eq!(snap.trace.available, 0, "step {step}: slept with a free trace unit");
                assert!(
                    snap.plot.available == 0 || snap.trace.done == 0,
                    "step {step}: slept while a plot was possible"
                );
                assert!(
                    !snap.gather_available || snap.plot.done == 0,
                    "step {step}: slept while a gather was possible"
                );
            } else {
                in_flight.push(task);
            }

            assert_eq!(snap.trace.total(), sizes.trace_units);
            assert_eq!(snap.plot.total(), sizes.plot_units);

            let held_traces: usize = in_flight
                .iter()
                .map(|t| match t {
                    Task::Trace { .. } => 1,
                    Task::Plot { traces, .. } => traces.len(),
                    _ => 0,
                })
                .sum();
            let held_plots: usize = in_flight
                .iter()
                .map(|t| match t {
                    Task::Plot { .. } => 1,
                    Task::Gather { plots } => plots.len(),
                    _ => 0,
                })
                .sum();
            assert_eq!(held_traces, snap.trace.in_flight);
            assert_eq!(held_plots, snap.plot.in_flight);

            let gathers = in_flight.iter().filter(|t| t.kind() == StageKind::Gather).count();
            let tonemaps = in_flight.iter().filter(|t| t.kind() == StageKind::Tonemap).count();
            assert!(gathers <= 1);
            assert!(tonemaps <= 1);
            assert!(gathers == 0 || tonemaps == 0, "gather and tonemap ran together");
            assert_eq!(snap.gather_available, gathers == 0 && tonemaps == 0);
            assert_eq!(snap.tonemap_available, tonemaps == 0);
        }

        assert!(s.performance().is_some(), "no tonemap happened in the simulation");
    }

    /// Workers on real threads must never be handed a unit someone else holds.
    #[test]
    fn concurrent_workers_never_share_units() {
        let s = Arc::new(scheduler(12, 2));
        let held = Arc::new(Mutex::new(HashSet::<(StageKind, usize)>::new()));

        fn units(task: &Task) -> Vec<(StageKind, usize)> {
            match task {
                Task::Trace { unit } => vec![(StageKind::Trace, unit.0)],
                Task::Plot { unit, traces } => std::iter::once((StageKind::Plot, unit.0))
                    .chain(traces.iter().map(|t| (StageKind::Trace, t.0)))
                    .collect(),
                Task::Gather { plots } => std::iter::once((StageKind::Gather, 0))
                    .chain(plots.iter().map(|p| (StageKind::Plot, p.0)))
                    .collect(),
                Task::Tonemap => vec![(StageKind::Tonemap, 0), (StageKind::Gather, 0)],
                Task::Sleep => vec![],
            }
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&s);
                let held = Arc::clone(&held);
                std::thread::spawn(move || {
                    // Units are forgotten before the scheduler can reissue them
                    let forget = |task: &Task| {
                        let mut held = held.lock().unwrap();
                        for unit in units(task) {
                            held.remove(&unit);
                        }
                    };
                    let claim = |task: &Task| {
                        let mut held = held.lock().unwrap();
                        for unit in units(task) {
                            assert!(held.insert(unit), "unit {unit:?} handed out twice");
                        }
                    };

                    let mut completed = Task::Sleep;
                    for _ in 0..2_000 {
                        forget(&completed);
                        let task = s.request_task(completed);
                        claim(&task);
                        completed = task;
                    }
                    forget(&completed);
                    s.complete(completed);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(held.lock().unwrap().is_empty());
        let snap = s.snapshot();
        assert_eq!(snap.trace.in_flight, 0);
        assert_eq!(snap.plot.in_flight, 0);
        assert!(snap.gather_available);
        assert!(snap.tonemap_available);
    }
}
