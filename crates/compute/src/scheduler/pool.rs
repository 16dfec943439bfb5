use std::collections::VecDeque;

use serde::Serialize;
use tracing::warn;

/// Lifecycle of a trace or plot unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitState {
    Available,
    InFlight,
    Done,
}

/// How many units of a pool are in each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UnitCensus {
    pub available: usize,
    pub in_flight: usize,
    pub done: usize,
}

impl UnitCensus {
    pub fn total(&self) -> usize {
        self.available + self.in_flight + self.done
    }
}

/// Fixed-size pool of interchangeable units.
///
/// Every unit has a state tag; available and done units are additionally
/// queued in arrival order so the oldest one is reused first.
#[derive(Debug, Clone)]
pub struct UnitPool {
    name: &'static str,
    states: Vec<UnitState>,
    available: VecDeque<usize>,
    done: VecDeque<usize>,
}

impl UnitPool {
    /// Create a pool of `size` units, all available.
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            states: vec![UnitState::Available; size],
            available: (0..size).collect(),
            done: VecDeque::with_capacity(size),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    pub fn done_len(&self) -> usize {
        self.done.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.len() - self.available.len() - self.done.len()
    }

    pub fn state(&self, unit: usize) -> Option<UnitState> {
        self.states.get(unit).copied()
    }

    pub fn census(&self) -> UnitCensus {
        UnitCensus {
            available: self.available_len(),
            in_flight: self.in_flight_len(),
            done: self.done_len(),
        }
    }

    /// Hand out the oldest available unit.
    pub fn take_available(&mut self) -> Option<usize> {
        let unit = self.available.pop_front()?;
        self.states[unit] = UnitState::InFlight;
        Some(unit)
    }

    /// Hand out up to `n` done units, oldest first.
    pub fn take_done(&mut self, n: usize) -> Vec<usize> {
        let n = n.min(self.done.len());
        let taken: Vec<usize> = self.done.drain(..n).collect();
        for &unit in &taken {
            self.states[unit] = UnitState::InFlight;
        }
        taken
    }

    /// Hand out every done unit.
    pub fn take_all_done(&mut self) -> Vec<usize> {
        self.take_done(self.done.len())
    }

    /// An in-flight unit finished producing work for a later stage.
    pub fn mark_done(&mut self, unit: usize) {
        if self.transition(unit, UnitState::Done) {
            self.done.push_back(unit);
        }
    }

    /// An in-flight unit's data was consumed; it may be reused.
    pub fn release(&mut self, unit: usize) {
        if self.transition(unit, UnitState::Available) {
            self.available.push_back(unit);
        }
    }

    fn transition(&mut self, unit: usize, to: UnitState) -> bool {
        match self.states.get(unit).copied() {
            Some(UnitState::InFlight) => {
                self.states[unit] = to;
                true
            }
            Some(from) => {
                warn!(
                    pool = self.name,
                    unit,
                    ?from,
                    ?to,
                    "ignoring transition of a unit that is not in flight"
                );
                false
            }
            None => {
                warn!(pool = self.name, unit, size = self.len(), "ignoring unknown unit");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_is_all_available() {
        let pool = UnitPool::new("trace", 4);
        assert_eq!(pool.len(), 4);
        assert_eq!(
            pool.census(),
            UnitCensus {
                available: 4,
                in_flight: 0,
                done: 0,
            }
        );
        assert!((0..4).all(|i| pool.state(i) == Some(UnitState::Available)));
    }

    #[test]
    fn units_are_handed_out_fifo() {
        let mut pool = UnitPool::new("trace", 3);
        assert_eq!(pool.take_available(), Some(0));
        assert_eq!(pool.take_available(), Some(1));

        pool.mark_done(1);
        pool.mark_done(0);
        // 1 finished first, so it is consumed first
        assert_eq!(pool.take_done(1), vec![1]);

        pool.release(1);
        assert_eq!(pool.take_available(), Some(2));
        assert_eq!(pool.take_available(), Some(1));
        assert_eq!(pool.take_available(), None);
    }

    #[test]
    fn full_cycle_keeps_census_total() {
        let mut pool = UnitPool::new("plot", 2);
        let unit = pool.take_available().unwrap();
        assert_eq!(pool.state(unit), Some(UnitState::InFlight));
        assert_eq!(pool.census().total(), 2);

        pool.mark_done(unit);
        assert_eq!(pool.state(unit), Some(UnitState::Done));
        assert_eq!(pool.census().total(), 2);

        let taken = pool.take_all_done();
        assert_eq!(taken, vec![unit]);
        assert_eq!(pool.in_flight_len(), 1);

        pool.release(unit);
        assert_eq!(
            pool.census(),
            UnitCensus {
                available: 2,
                in_flight: 0,
                done: 0,
            }
        );
    }

    #[test]
    fn take_done_is_bounded_by_backlog() {
        let mut pool = UnitPool::new("trace", 5);
        for _ in 0..3 {
            let unit = pool.take_available().unwrap();
            pool.mark_done(unit);
        }
        assert_eq!(pool.take_done(10).len(), 3);
        assert!(pool.take_done(1).is_empty());
    }

    #[test]
    fn invalid_transitions_do_not_duplicate_units() {
        let mut pool = UnitPool::new("trace", 2);

        // Releasing an available unit must not queue it twice
        pool.release(0);
        assert_eq!(pool.available_len(), 2);

        let unit = pool.take_available().unwrap();
        pool.mark_done(unit);
        pool.mark_done(unit);
        assert_eq!(pool.done_len(), 1);

        pool.release(99);
        assert_eq!(pool.census().total(), 2);
    }
}
