//! The event loop: tick algorithm, idle detection, stop/resume.
//!
//! One loop per execution context, threaded explicitly into every awaitable,
//! watch and emit queue built on it. The handle is a cheap clone over shared
//! state and is deliberately `!Send`: scheduling is single-threaded and
//! cooperative, so no locking exists anywhere in the crate.
//!
//! A tick runs four phases:
//! 1. due timers, deadline order, ties by registration order;
//! 2. immediate callbacks enqueued so far (mid-phase schedules defer to the
//!    next tick, so a callback chain cannot starve I/O);
//! 3. block in the manager's poll for at most the time until the next
//!    deadline, or not at all when immediates are pending;
//! 4. dispatch ready watches.
//!
//! The loop terminates when no timers, no immediates and no armed watches
//! remain. `stop()` leaves all work intact; a later `run()` resumes it.

use crate::error::LoopError;
use crate::reactor::manager::{Direction, Readiness, ResourceManager, WatchHandle};
use crate::runtime::timers::{TimerHandle, TimerQueue};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Immediate callback; fallible like everything the loop invokes.
pub(crate) type Scheduled = Box<dyn FnOnce() -> Result<(), LoopError>>;

struct LoopInner {
    ready: VecDeque<Scheduled>,
    timers: TimerQueue,
    manager: Box<dyn ResourceManager>,
    stop: bool,
}

/// Handle to a single-threaded cooperative event loop.
///
/// Cloning shares the loop; every primitive in this crate takes an
/// `&EventLoop` at construction instead of reaching for ambient global
/// state, which keeps loops isolated per test.
///
/// # Example
/// ```ignore
/// let lp = EventLoop::new();
/// lp.schedule(|| {
///     println!("ran on the first tick");
///     Ok(())
/// });
/// lp.run()?;
/// ```
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<RefCell<LoopInner>>,
}

impl EventLoop {
    /// Creates a loop over the default poll(2) backend, signals disabled.
    pub fn new() -> Self {
        Self::with_manager(Box::new(crate::reactor::PollManager::new()))
    }

    /// Creates a loop over a caller-provided resource event manager.
    pub fn with_manager(manager: Box<dyn ResourceManager>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(LoopInner {
                ready: VecDeque::new(),
                timers: TimerQueue::new(),
                manager,
                stop: false,
            })),
        }
    }

    /// Enqueues a callback to run on the next tick. FIFO: two schedules run
    /// in the order they were made.
    pub fn schedule(&self, callback: impl FnOnce() -> Result<(), LoopError> + 'static) {
        self.inner.borrow_mut().ready.push_back(Box::new(callback));
    }

    /// Arms a timer firing after `delay`; when `periodic`, it repeats with
    /// the same period until cancelled.
    pub fn timer(
        &self,
        delay: Duration,
        periodic: bool,
        callback: impl FnMut() -> Result<(), LoopError> + 'static,
    ) -> Result<TimerHandle, LoopError> {
        self.inner
            .borrow_mut()
            .timers
            .insert(delay, periodic, Box::new(callback))
    }

    /// Disarms a timer. Idempotent once the timer fired or was cancelled.
    pub fn cancel_timer(&self, handle: TimerHandle) {
        self.inner.borrow_mut().timers.cancel(handle);
    }

    /// Creates and arms a watch in one step.
    pub fn watch(
        &self,
        resource: RawFd,
        direction: Direction,
        callback: impl FnMut(Readiness) -> Result<(), LoopError> + 'static,
    ) -> Result<WatchHandle, LoopError> {
        let mut inner = self.inner.borrow_mut();
        let handle = inner.manager.create(resource, direction, Box::new(callback))?;
        inner.manager.listen(handle, None)?;
        Ok(handle)
    }

    /// Destroys a watch created by [`EventLoop::watch`] or
    /// [`EventLoop::create_watch`].
    pub fn unwatch(&self, handle: WatchHandle) -> Result<(), LoopError> {
        self.inner.borrow_mut().manager.free(handle)
    }

    /// Registers a watch without arming it.
    pub fn create_watch(
        &self,
        resource: RawFd,
        direction: Direction,
        callback: impl FnMut(Readiness) -> Result<(), LoopError> + 'static,
    ) -> Result<WatchHandle, LoopError> {
        self.inner
            .borrow_mut()
            .manager
            .create(resource, direction, Box::new(callback))
    }

    /// Arms a watch; an optional timeout fires the callback flagged as
    /// [`Readiness::TimedOut`] if no readiness arrives first.
    pub fn listen(&self, handle: WatchHandle, timeout: Option<Duration>) -> Result<(), LoopError> {
        self.inner.borrow_mut().manager.listen(handle, timeout)
    }

    /// Disarms a watch without destroying it.
    pub fn cancel_watch(&self, handle: WatchHandle) -> Result<(), LoopError> {
        self.inner.borrow_mut().manager.cancel(handle)
    }

    /// Whether a watch is armed and waiting.
    pub fn is_pending(&self, handle: WatchHandle) -> Result<bool, LoopError> {
        self.inner.borrow().manager.is_pending(handle)
    }

    /// Whether a handle refers to a destroyed watch.
    pub fn is_freed(&self, handle: WatchHandle) -> bool {
        self.inner.borrow().manager.is_freed(handle)
    }

    /// Requests that `run()` return after the current tick, leaving all
    /// queued work intact.
    pub fn stop(&self) {
        log::debug!("event loop stop requested");
        self.inner.borrow_mut().stop = true;
    }

    /// Runs ticks until no work remains or `stop()` is called.
    ///
    /// Returns `Ok(true)` when the loop drained to idle, `Ok(false)` when it
    /// was stopped with work remaining. A failing callback propagates as
    /// `Err` with every queue intact, so the caller may handle it and call
    /// `run()` again.
    ///
    /// Reentrant: a callback may call `run()` (this is how a blocking
    /// `Promise::wait` drains the loop from inside a tick).
    pub fn run(&self) -> Result<bool, LoopError> {
        self.inner.borrow_mut().stop = false;
        log::trace!("event loop running");

        loop {
            if self.is_idle() {
                log::trace!("event loop idle, terminating");
                return Ok(true);
            }

            self.run_due_timers()?;
            self.run_ready()?;
            self.poll_resources()?;

            if self.inner.borrow().stop {
                return Ok(false);
            }
        }
    }

    /// No timers, no immediates, no armed watches.
    fn is_idle(&self) -> bool {
        let inner = self.inner.borrow();
        inner.ready.is_empty() && inner.timers.is_empty() && inner.manager.is_empty()
    }

    /// Phase 1: timers due at phase start, in deadline order. The `now`
    /// snapshot keeps a chain of zero-delay timers from starving the rest of
    /// the tick.
    fn run_due_timers(&self) -> Result<(), LoopError> {
        let now = Instant::now();
        loop {
            let due = self.inner.borrow_mut().timers.pop_due(now);
            let Some(mut due) = due else { return Ok(()) };

            let result = (due.callback)();
            self.inner.borrow_mut().timers.restore(due.id, due.callback);
            if let Err(error) = result {
                log::error!("timer callback failed: {error}");
                return Err(error);
            }
        }
    }

    /// Phase 2: the immediates enqueued so far. Anything scheduled while the
    /// batch runs lands in the next tick. On a callback failure the
    /// untouched remainder is pushed back so the loop stays resumable.
    fn run_ready(&self) -> Result<(), LoopError> {
        let mut batch = mem::take(&mut self.inner.borrow_mut().ready);

        while let Some(callback) = batch.pop_front() {
            if let Err(error) = callback() {
                log::error!("scheduled callback failed: {error}");
                let mut inner = self.inner.borrow_mut();
                batch.append(&mut inner.ready);
                inner.ready = batch;
                return Err(error);
            }
        }
        Ok(())
    }

    /// Phases 3 and 4: block in the manager for at most the time until the
    /// next timer deadline, then dispatch ready watches. Never blocks when
    /// immediates are pending, and never blocks indefinitely without an
    /// armed watch.
    fn poll_resources(&self) -> Result<(), LoopError> {
        let timeout = {
            let mut inner = self.inner.borrow_mut();
            let has_ready = !inner.ready.is_empty();
            let next_timer = inner.timers.next_deadline();

            if inner.manager.is_empty() {
                match (has_ready, next_timer) {
                    // Nothing to poll, work queued: go straight to the next
                    // tick.
                    (true, _) => return Ok(()),
                    // Fully idle on the resource side.
                    (false, None) => return Ok(()),
                    // Only timers remain; poll with an empty set is the
                    // sleep until the next deadline.
                    (false, Some(deadline)) => {
                        Some(deadline.saturating_duration_since(Instant::now()))
                    }
                }
            } else if has_ready {
                Some(Duration::ZERO)
            } else {
                next_timer.map(|deadline| deadline.saturating_duration_since(Instant::now()))
            }
        };

        let firings = self.inner.borrow_mut().manager.poll(timeout)?;

        for firing in firings {
            let callback = self.inner.borrow_mut().manager.take_callback(firing.handle);
            let Some(mut callback) = callback else { continue };

            let result = callback(firing.readiness);
            self.inner
                .borrow_mut()
                .manager
                .restore_callback(firing.handle, callback);
            if let Err(error) = result {
                log::error!("watch callback failed: {error}");
                return Err(error);
            }
        }
        Ok(())
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
