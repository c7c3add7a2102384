//! Timer queue for the event loop.
//!
//! Timers are ordered by deadline, ties broken by registration order. The
//! heap holds light entries and the state map holds callbacks, so cancelling
//! is O(1): the state disappears and stale heap entries are skipped when they
//! surface.

use crate::error::LoopError;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Opaque identifier for an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// Callback invoked when a timer fires. `FnMut` so periodic timers can fire
/// repeatedly.
pub type TimerCallback = Box<dyn FnMut() -> Result<(), LoopError>>;

#[derive(PartialEq, Eq)]
struct HeapEntry {
    deadline: Instant,
    seq: u64,
    id: u64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerState {
    callback: Option<TimerCallback>,
    period: Option<Duration>,
}

/// A timer popped for dispatch; the callback is handed to the loop and put
/// back via [`TimerQueue::restore`] after the call.
pub(crate) struct DueTimer {
    pub(crate) id: u64,
    pub(crate) callback: TimerCallback,
}

pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    states: HashMap<u64, TimerState>,
    next_id: u64,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            states: HashMap::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// Arms a timer firing after `delay`, repeating with period `delay` when
    /// `periodic`. A zero-period periodic timer is rejected: it would never
    /// let the loop reach its poll phase.
    pub(crate) fn insert(
        &mut self,
        delay: Duration,
        periodic: bool,
        callback: TimerCallback,
    ) -> Result<TimerHandle, LoopError> {
        if periodic && delay.is_zero() {
            return Err(LoopError::InvalidArgument(
                "periodic timer requires a non-zero period".into(),
            ));
        }

        let id = self.next_id;
        self.next_id += 1;

        self.states.insert(
            id,
            TimerState {
                callback: Some(callback),
                period: periodic.then_some(delay),
            },
        );
        self.push_entry(id, Instant::now() + delay);

        Ok(TimerHandle(id))
    }

    fn push_entry(&mut self, id: u64, deadline: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(HeapEntry { deadline, seq, id }));
    }

    /// Disarms a timer. Idempotent: already-fired and already-cancelled
    /// handles are no-ops.
    pub(crate) fn cancel(&mut self, handle: TimerHandle) {
        self.states.remove(&handle.0);
    }

    /// Pops the next timer due at `now`, skipping entries whose timer was
    /// cancelled. Periodic timers are re-armed before their callback runs so
    /// a cancel from inside the callback sticks.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<DueTimer> {
        loop {
            let entry = self.heap.peek()?;
            if entry.0.deadline > now {
                return None;
            }
            let entry = self.heap.pop().expect("peeked entry must pop").0;

            let Some(state) = self.states.get_mut(&entry.id) else {
                continue; // cancelled; stale heap entry
            };
            let Some(callback) = state.callback.take() else {
                // Dispatched right now by an outer tick (a reentrant run
                // inside its own callback); keep the entry for later.
                self.heap.push(Reverse(entry));
                return None;
            };

            match state.period {
                Some(period) => {
                    // Re-arm from now, not from the old deadline, so a slow
                    // callback does not cause a burst of catch-up fires.
                    self.push_entry(entry.id, now + period);
                }
                None => {
                    self.states.remove(&entry.id);
                }
            }

            return Some(DueTimer {
                id: entry.id,
                callback,
            });
        }
    }

    /// Returns a dispatched callback to its (periodic) timer. A no-op when
    /// the timer was one-shot or cancelled during its own callback.
    pub(crate) fn restore(&mut self, id: u64, callback: TimerCallback) {
        if let Some(state) = self.states.get_mut(&id) {
            state.callback = Some(callback);
        }
    }

    /// Whether any armed timer remains.
    pub(crate) fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Earliest deadline among armed timers, dropping stale entries on the
    /// way.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            if self.states.contains_key(&entry.0.id) {
                return Some(entry.0.deadline);
            }
            self.heap.pop();
        }
        None
    }
}
