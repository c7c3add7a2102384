//! Derived-awaitable wrappers: cancellation guards, deadlines, delays and
//! lazy producers.

use crate::error::LoopError;
use crate::promise::core::{Promise, Resolver};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

impl<T: Clone + 'static> Promise<T> {
    /// Returns a wrapper that forwards this promise's settlement but
    /// suppresses `cancel`.
    ///
    /// Protects a shared inner awaitable from one consumer's cancel request:
    /// each consumer holds an uncancellable wrapper while the producer keeps
    /// the only cancellable handle.
    pub fn uncancellable(&self) -> Promise<T> {
        let (wrapper, resolver) = Promise::deferred(&self.event_loop());
        wrapper.guard();
        self.register(Box::new(move |outcome| {
            resolver.settle(outcome);
            Ok(())
        }));
        wrapper
    }

    /// Races this promise against a deadline.
    ///
    /// The returned promise rejects with `reason` (default: a timed-out
    /// error) if the source has not settled within `duration`; the source's
    /// own outcome wins and disarms the timer if it settles first. The
    /// source itself is never cancelled by this wrapper.
    pub fn timeout(&self, duration: Duration, reason: Option<LoopError>) -> Promise<T> {
        let lp = self.event_loop();
        let (wrapper, resolver) = Promise::deferred(&lp);

        let timer = {
            let resolver = resolver.clone();
            let mut reason = Some(reason.unwrap_or_else(|| {
                LoopError::TimedOut(format!("awaitable did not settle within {duration:?}"))
            }));
            lp.timer(duration, false, move || {
                if let Some(reason) = reason.take() {
                    resolver.reject(reason);
                }
                Ok(())
            })
        };

        match timer {
            Ok(timer) => {
                let lp = lp.clone();
                self.register(Box::new(move |outcome| {
                    lp.cancel_timer(timer);
                    resolver.settle(outcome);
                    Ok(())
                }));
            }
            Err(error) => resolver.reject(error),
        }

        wrapper
    }

    /// Settles with this promise's fulfilment only after an extra delay.
    /// Rejections propagate immediately, unaffected by the delay.
    pub fn delay(&self, duration: Duration) -> Promise<T> {
        let lp = self.event_loop();
        let (wrapper, resolver) = Promise::deferred(&lp);

        self.register(Box::new(move |outcome| {
            match outcome {
                Ok(value) => {
                    let resolver = resolver.clone();
                    let mut value = Some(value);
                    lp.timer(duration, false, move || {
                        if let Some(value) = value.take() {
                            resolver.fulfill(value);
                        }
                        Ok(())
                    })?;
                }
                Err(reason) => resolver.reject(reason),
            }
            Ok(())
        }));

        wrapper
    }
}

/// Deferred-start wrapper around a promise producer.
///
/// The producer runs on first consumption (`get`, `then`, `wait`, `cancel`)
/// and at most once; the resulting promise is cached and shared by every
/// later consumer.
///
/// # Example
/// ```ignore
/// let lazy = Lazy::new(move || expensive_lookup(&lp));
/// // Nothing has run yet.
/// let value = lazy.wait()?; // producer runs here, exactly once
/// ```
pub struct Lazy<T> {
    producer: RefCell<Option<Box<dyn FnOnce() -> Promise<T>>>>,
    cached: RefCell<Option<Promise<T>>>,
}

impl<T: Clone + 'static> Lazy<T> {
    /// Wraps a producer without invoking it.
    pub fn new(producer: impl FnOnce() -> Promise<T> + 'static) -> Rc<Self> {
        Rc::new(Self {
            producer: RefCell::new(Some(Box::new(producer))),
            cached: RefCell::new(None),
        })
    }

    /// Whether the producer has run.
    pub fn is_started(&self) -> bool {
        self.cached.borrow().is_some()
    }

    /// Returns the underlying promise, invoking the producer on the first
    /// call.
    pub fn get(&self) -> Promise<T> {
        if let Some(promise) = self.cached.borrow().as_ref() {
            return promise.clone();
        }

        let producer = self
            .producer
            .borrow_mut()
            .take()
            .expect("producer present until first get");
        let promise = producer();
        *self.cached.borrow_mut() = Some(promise.clone());
        promise
    }

    /// Starts (if needed) and derives from the underlying promise.
    pub fn then<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> crate::promise::Step<U> + 'static,
        G: FnOnce(LoopError) -> crate::promise::Step<U> + 'static,
    {
        self.get().then(on_fulfilled, on_rejected)
    }

    /// Starts (if needed) and blocks until settlement.
    pub fn wait(&self) -> Result<T, LoopError> {
        self.get().wait()
    }

    /// Starts (if needed) and cancels the underlying promise.
    pub fn cancel(&self, reason: Option<LoopError>) {
        self.get().cancel(reason);
    }
}

/// Convenience: a resolver pre-wired with a cleanup action.
///
/// Mirrors the common producer pattern of allocating a resource, exposing a
/// promise for its result and releasing the resource if the consumer
/// cancels first.
pub fn deferred_with_cleanup<T: Clone + 'static>(
    lp: &crate::runtime::EventLoop,
    cleanup: impl FnOnce() + 'static,
) -> (Promise<T>, Resolver<T>) {
    let (promise, resolver) = Promise::deferred(lp);
    resolver.on_cancel(cleanup);
    (promise, resolver)
}
