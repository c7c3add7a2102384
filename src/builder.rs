//! Fluent builder for event loop construction.
//!
//! Mirrors the loop's feature gating: signal watches are only available when
//! explicitly enabled, and the resource backend can be swapped for any
//! `ResourceManager` implementation.

use crate::error::LoopError;
use crate::reactor::manager::ResourceManager;
use crate::reactor::poll::PollManager;
use crate::runtime::EventLoop;

/// Builder for [`EventLoop`] instances.
///
/// # Example
/// ```ignore
/// let lp = LoopBuilder::new().enable_signals().build()?;
/// ```
pub struct LoopBuilder {
    signals: bool,
    manager: Option<Box<dyn ResourceManager>>,
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopBuilder {
    /// Creates a builder for a poll-backed loop with signals disabled.
    pub fn new() -> Self {
        Self {
            signals: false,
            manager: None,
        }
    }

    /// Enables signal watches for the loop being built.
    ///
    /// Without this, creating a `Direction::Signal` watch fails with
    /// [`LoopError::SignalsDisabled`].
    pub fn enable_signals(mut self) -> Self {
        self.signals = true;
        self
    }

    /// Replaces the default poll(2) backend with a custom manager.
    ///
    /// The manager decides its own signal support; `enable_signals` only
    /// applies to the default backend.
    pub fn with_manager(mut self, manager: Box<dyn ResourceManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Builds the configured event loop.
    pub fn build(self) -> Result<EventLoop, LoopError> {
        let manager: Box<dyn ResourceManager> = match self.manager {
            Some(manager) => manager,
            None if self.signals => Box::new(PollManager::with_signals()?),
            None => Box::new(PollManager::new()),
        };
        Ok(EventLoop::with_manager(manager))
    }
}
