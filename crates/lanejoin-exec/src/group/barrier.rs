//! Group barrier with collective reductions.
//!
//! All lanes of a group call the same collectives in the same order. A
//! collective returns once every lane has arrived; the last lane to arrive
//! computes the exclusive prefix sum and the total of the contributions.
//!
//! | collective        | contribution | result                  |
//! |-------------------|--------------|-------------------------|
//! | `sync`            | none         | none                    |
//! | `count`           | bool         | lanes that passed true  |
//! | `any`             | bool         | count > 0               |
//! | `stairlike_count` | bool         | (prefix, total)         |
//! | `stairlike_sum`   | u32          | (prefix, total)         |

use std::thread;

use parking_lot::{Condvar, Mutex};

struct BarrierState {
    generation: u64,
    arrived: usize,
    inputs: Vec<u32>,
    prefix: Vec<u32>,
    total: u32,
    poisoned: bool,
}

/// Barrier shared by the lanes of one group.
///
/// # Example
///
/// ```rust
/// use lanejoin_exec::group::LaneBarrier;
///
/// let barrier = LaneBarrier::new(4);
/// let results: Vec<(u32, u32)> = std::thread::scope(|s| {
///     let handles: Vec<_> = (0..4)
///         .map(|lane| {
///             let barrier = &barrier;
///             s.spawn(move || barrier.stairlike_count(lane, lane % 2 == 1))
///         })
///         .collect();
///     handles.into_iter().map(|h| h.join().unwrap()).collect()
/// });
/// assert_eq!(results, vec![(0, 2), (0, 2), (1, 2), (1, 2)]);
/// ```
pub struct LaneBarrier {
    lanes: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl LaneBarrier {
    /// Creates a barrier for `lanes` lanes.
    ///
    /// # Panics
    ///
    /// Panics if `lanes` is zero.
    #[must_use]
    pub fn new(lanes: usize) -> Self {
        assert!(lanes > 0, "a group needs at least one lane");
        Self {
            lanes,
            state: Mutex::new(BarrierState {
                generation: 0,
                arrived: 0,
                inputs: vec![0; lanes],
                prefix: vec![0; lanes],
                total: 0,
                poisoned: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Returns the group width.
    #[inline]
    #[must_use]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Contributes `value` and returns `(exclusive prefix, total)` over all
    /// lanes. Totals saturate at `u32::MAX`.
    ///
    /// # Panics
    ///
    /// Panics if the barrier was poisoned by a panicking lane.
    pub fn exchange(&self, lane: usize, value: u32) -> (u32, u32) {
        assert!(lane < self.lanes, "lane {lane} out of range ({})", self.lanes);
        let mut state = self.state.lock();
        if state.poisoned {
            drop(state);
            panic!("lane barrier poisoned by a panicking lane");
        }

        let generation = state.generation;
        state.inputs[lane] = value;
        state.arrived += 1;

        if state.arrived == self.lanes {
            let st = &mut *state;
            let mut acc: u64 = 0;
            for (prefix, input) in st.prefix.iter_mut().zip(&st.inputs) {
                *prefix = saturate(acc);
                acc += u64::from(*input);
            }
            st.total = saturate(acc);
            st.arrived = 0;
            st.generation += 1;
            self.cvar.notify_all();
        } else {
            while state.generation == generation {
                if state.poisoned {
                    drop(state);
                    panic!("lane barrier poisoned by a panicking lane");
                }
                self.cvar.wait(&mut state);
            }
        }

        (state.prefix[lane], state.total)
    }

    /// Waits for every lane.
    #[inline]
    pub fn sync(&self, lane: usize) {
        self.exchange(lane, 0);
    }

    /// Returns the number of lanes passing `flag`.
    #[inline]
    pub fn count(&self, lane: usize, flag: bool) -> u32 {
        self.exchange(lane, u32::from(flag)).1
    }

    /// Returns true if any lane passes `flag`.
    #[inline]
    pub fn any(&self, lane: usize, flag: bool) -> bool {
        self.count(lane, flag) > 0
    }

    /// Returns `(lower lanes passing true, lanes passing true)`.
    ///
    /// Lanes passing true get distinct, gap-free slots `base + prefix`.
    #[inline]
    pub fn stairlike_count(&self, lane: usize, flag: bool) -> (u32, u32) {
        self.exchange(lane, u32::from(flag))
    }

    /// Returns `(sum over lower lanes, sum over all lanes)`.
    #[inline]
    pub fn stairlike_sum(&self, lane: usize, value: u32) -> (u32, u32) {
        self.exchange(lane, value)
    }

    /// Marks the barrier poisoned and wakes every waiting lane.
    pub fn poison(&self) {
        self.state.lock().poisoned = true;
        self.cvar.notify_all();
    }

    /// Returns true if a lane panicked.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned
    }

    /// Returns a guard that poisons the barrier if the holding lane unwinds.
    #[must_use]
    pub fn poison_on_panic(&self) -> PoisonOnPanic<'_> {
        PoisonOnPanic { barrier: self }
    }
}

impl std::fmt::Debug for LaneBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneBarrier")
            .field("lanes", &self.lanes)
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

/// Poisons its barrier when dropped during a panic.
pub struct PoisonOnPanic<'a> {
    barrier: &'a LaneBarrier,
}

impl Drop for PoisonOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.barrier.poison();
        }
    }
}

fn saturate(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
