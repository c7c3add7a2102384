//! The resource event manager contract.
//!
//! A `ResourceManager` owns every watch: registered interest in one
//! (resource, direction) pair. The event loop only ever talks to this trait,
//! so backends (poll, select, native reactors) are interchangeable at
//! construction time.

use crate::error::LoopError;

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// What a watch is interested in.
///
/// `Signal` watches use the signal number as their resource and are
/// persistent: they re-arm themselves after every delivery until freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
    Signal,
}

/// Why a watch callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The resource became readable.
    Readable,
    /// The resource became writable.
    Writable,
    /// The watched signal was delivered; carries the signal number.
    Signal(i32),
    /// The listen timeout elapsed before any readiness.
    TimedOut,
}

/// Opaque identifier for one watch.
///
/// Carries a generation so a handle kept across `free` reports
/// [`LoopError::HandleFreed`] instead of aliasing a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHandle {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// One ready watch reported by a poll.
#[derive(Debug, Clone, Copy)]
pub struct Firing {
    pub handle: WatchHandle,
    pub readiness: Readiness,
}

/// Callback invoked when a watch fires; fallible like every loop callback.
pub type WatchCallback = Box<dyn FnMut(Readiness) -> Result<(), LoopError>>;

/// Contract between the event loop and a readiness backend.
///
/// At most one watch may exist per (resource, direction) pair; `create` for
/// an occupied pair fails with [`LoopError::ResourceBusy`]. A freed handle
/// fails every later operation with [`LoopError::HandleFreed`].
pub trait ResourceManager {
    /// Registers a watch for `resource` in `direction`. The watch starts
    /// disarmed; call [`ResourceManager::listen`] to arm it.
    fn create(
        &mut self,
        resource: RawFd,
        direction: Direction,
        callback: WatchCallback,
    ) -> Result<WatchHandle, LoopError>;

    /// Arms the watch. A timeout, clamped to a minimum positive threshold,
    /// fires the callback with [`Readiness::TimedOut`] if no readiness
    /// arrives first.
    fn listen(&mut self, handle: WatchHandle, timeout: Option<Duration>) -> Result<(), LoopError>;

    /// Disarms the watch without destroying it.
    fn cancel(&mut self, handle: WatchHandle) -> Result<(), LoopError>;

    /// Destroys the watch. Later operations on the handle fail with
    /// [`LoopError::HandleFreed`].
    fn free(&mut self, handle: WatchHandle) -> Result<(), LoopError>;

    /// Whether the watch is armed and has not fired yet.
    fn is_pending(&self, handle: WatchHandle) -> Result<bool, LoopError>;

    /// Whether the handle refers to a destroyed watch.
    fn is_freed(&self, handle: WatchHandle) -> bool;

    /// Whether no armed watches remain. Disarmed watches are inert: they
    /// must never keep a loop blocking.
    fn is_empty(&self) -> bool;

    /// Earliest listen-timeout deadline among armed watches, if any.
    fn next_deadline(&self) -> Option<Instant>;

    /// Blocks for at most `timeout` (`None` blocks indefinitely) and returns
    /// the watches that fired. Read/write watches are disarmed before being
    /// reported; signal watches stay armed.
    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Firing>, LoopError>;

    /// Takes the callback out of a watch so the loop can invoke it without
    /// holding the manager borrowed. Returns `None` if the watch vanished.
    fn take_callback(&mut self, handle: WatchHandle) -> Option<WatchCallback>;

    /// Puts a callback taken by [`ResourceManager::take_callback`] back.
    /// A no-op when the watch was freed during its own invocation.
    fn restore_callback(&mut self, handle: WatchHandle, callback: WatchCallback);
}
