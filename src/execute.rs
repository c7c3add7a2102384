//! Top-level synchronous entry point.

use crate::error::LoopError;
use crate::promise::Promise;
use crate::runtime::EventLoop;

use std::cell::RefCell;
use std::rc::Rc;

/// What an [`execute`] callback hands back to the runtime.
pub enum Ran<T> {
    /// A plain value, wrapped into an already-fulfilled awaitable.
    Value(T),
    /// An awaitable (including a driven coroutine's completion).
    Awaitable(Promise<T>),
}

/// Invokes `callback` with a fresh event loop, runs the loop to completion
/// and returns the settlement of the callback's result.
///
/// A rejection propagates as the returned error once the loop has stopped.
/// If the loop is stopped early, or goes idle, with the result still
/// pending, the call fails with [`LoopError::Stalled`].
///
/// # Example
/// ```ignore
/// let value = execute(|lp| {
///     let (promise, resolver) = Promise::deferred(lp);
///     lp.schedule(move || {
///         resolver.fulfill(42);
///         Ok(())
///     });
///     Ran::Awaitable(promise)
/// })?;
/// assert_eq!(value, 42);
/// ```
pub fn execute<T, F>(callback: F) -> Result<T, LoopError>
where
    T: Clone + 'static,
    F: FnOnce(&EventLoop) -> Ran<T>,
{
    let lp = EventLoop::new();

    let promise = match callback(&lp) {
        Ran::Value(value) => Promise::fulfilled(&lp, value),
        Ran::Awaitable(promise) => promise,
    };

    let settled: Rc<RefCell<Option<Result<T, LoopError>>>> = Rc::new(RefCell::new(None));
    let sink = settled.clone();
    promise.register(Box::new(move |outcome| {
        *sink.borrow_mut() = Some(outcome);
        Ok(())
    }));

    lp.run()?;

    settled.borrow_mut().take().unwrap_or(Err(LoopError::Stalled))
}
