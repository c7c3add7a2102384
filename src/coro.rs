//! Coroutine driver: an explicit state machine advanced by settled
//! awaitables.
//!
//! Generator-style coroutines become a [`Resumable`]: a resumable
//! computation that yields awaitables and is advanced by feeding back each
//! settlement. On a fulfilment the machine resumes with the value; on a
//! rejection the reason is injected so the machine may recover or propagate.
//! The driver's own completion is an ordinary [`Promise`], so driven
//! coroutines compose transparently with the combinators.

use crate::error::LoopError;
use crate::promise::{Promise, Resolver};
use crate::runtime::EventLoop;

use std::cell::RefCell;
use std::rc::Rc;

/// One step of a resumable computation.
pub enum Drive<I, O> {
    /// Suspend until this awaitable settles, then resume with its outcome.
    Await(Promise<I>),
    /// The computation finished with a value.
    Finish(O),
    /// The computation failed (or chose to propagate an injected rejection).
    Fail(LoopError),
}

/// A resumable computation driven by the event loop.
///
/// `resume` receives `Ok(None)` on the first call, `Ok(Some(value))` after
/// a yielded awaitable fulfils, and `Err(reason)` after one rejects.
pub trait Resumable {
    /// Value type carried by the awaitables this computation yields.
    type Item: Clone + 'static;
    /// Final result type.
    type Output: Clone + 'static;

    fn resume(
        &mut self,
        input: Result<Option<Self::Item>, LoopError>,
    ) -> Drive<Self::Item, Self::Output>;
}

/// Drives a [`Resumable`] to completion, exposing the result as a promise.
pub fn drive<R>(lp: &EventLoop, machine: R) -> Promise<R::Output>
where
    R: Resumable + 'static,
{
    let (result, resolver) = Promise::deferred(lp);
    let machine = Rc::new(RefCell::new(machine));

    // First resumption runs from a scheduled callback, not synchronously,
    // matching how settlements are always delivered through the loop.
    let starter = machine.clone();
    let start_resolver = resolver.clone();
    lp.schedule(move || {
        advance(starter, start_resolver, Ok(None));
        Ok(())
    });

    result
}

/// Feeds one input into the machine and wires up the next suspension.
fn advance<R>(machine: Rc<RefCell<R>>, resolver: Resolver<R::Output>, input: Result<Option<R::Item>, LoopError>)
where
    R: Resumable + 'static,
{
    let step = machine.borrow_mut().resume(input);
    match step {
        Drive::Await(promise) => {
            promise.register(Box::new(move |outcome| {
                advance(machine, resolver, outcome.map(Some));
                Ok(())
            }));
        }
        Drive::Finish(output) => resolver.fulfill(output),
        Drive::Fail(reason) => resolver.reject(reason),
    }
}
