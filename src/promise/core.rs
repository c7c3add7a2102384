//! Resolve-once awaitable state machine.
//!
//! A [`Promise`] is the consumer side of a deferred value; its [`Resolver`]
//! is the producer side. The state machine is `Pending` until exactly one
//! settlement: `Fulfilled` with a value or `Rejected` with a [`LoopError`]
//! reason. Cancellation is a rejection with `LoopError::Cancelled`
//! provenance, triggered by a consumer instead of the producer.
//!
//! Reactions registered with `then`/`done` are delivered exactly once, in
//! registration order, and always through the event loop, never
//! synchronously, even when the promise is already settled.

use crate::error::LoopError;
use crate::runtime::EventLoop;

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

/// What a `then` handler turns a settlement into.
pub enum Step<U> {
    /// Fulfil the derived promise with this value.
    Done(U),
    /// Reject the derived promise with this reason.
    Fail(LoopError),
    /// Adopt another awaitable's settlement (recursively unwrapped).
    Chain(Promise<U>),
}

enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(LoopError),
}

/// Reaction delivered once the promise settles. The returned `Result` flows
/// back out of `EventLoop::run`, which is how `done` handler failures
/// escalate to loop-level fatals.
pub(crate) type Reaction<T> = Box<dyn FnOnce(Result<T, LoopError>) -> Result<(), LoopError>>;

struct Shared<T> {
    state: State<T>,
    reactions: Vec<Reaction<T>>,
    on_cancel: Option<Box<dyn FnOnce()>>,
    /// Set by `uncancellable()`: consumer cancels are suppressed.
    guarded: bool,
    lp: EventLoop,
}

/// Deferred value with exactly one settlement.
///
/// Cloning shares the underlying state; after settlement every clone
/// observes the same immutable outcome.
pub struct Promise<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Producer side of a [`Promise`].
pub struct Resolver<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Creates a pending promise and its resolver.
    pub fn deferred(lp: &EventLoop) -> (Promise<T>, Resolver<T>) {
        let shared = Rc::new(RefCell::new(Shared {
            state: State::Pending,
            reactions: Vec::new(),
            on_cancel: None,
            guarded: false,
            lp: lp.clone(),
        }));
        (
            Promise {
                shared: shared.clone(),
            },
            Resolver { shared },
        )
    }

    /// Creates a promise already fulfilled with `value`.
    pub fn fulfilled(lp: &EventLoop, value: T) -> Promise<T> {
        let (promise, resolver) = Promise::deferred(lp);
        resolver.fulfill(value);
        promise
    }

    /// Creates a promise already rejected with `reason`.
    pub fn rejected(lp: &EventLoop, reason: LoopError) -> Promise<T> {
        let (promise, resolver) = Promise::deferred(lp);
        resolver.reject(reason);
        promise
    }

    /// The loop this promise delivers through.
    pub fn event_loop(&self) -> EventLoop {
        self.shared.borrow().lp.clone()
    }

    /// Whether the promise has left `Pending`.
    pub fn is_settled(&self) -> bool {
        !matches!(self.shared.borrow().state, State::Pending)
    }

    /// The settlement, if any. Payloads are cloned: settled state is shared
    /// read-only between consumers.
    pub fn outcome(&self) -> Option<Result<T, LoopError>> {
        match &self.shared.borrow().state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    /// Registers a reaction; delivery is deferred through the loop even when
    /// already settled, preserving registration order.
    pub(crate) fn register(&self, reaction: Reaction<T>) {
        let settled = {
            let mut shared = self.shared.borrow_mut();
            match &shared.state {
                State::Pending => {
                    shared.reactions.push(reaction);
                    None
                }
                State::Fulfilled(value) => Some((Ok(value.clone()), shared.lp.clone(), reaction)),
                State::Rejected(reason) => Some((Err(reason.clone()), shared.lp.clone(), reaction)),
            }
        };

        if let Some((outcome, lp, reaction)) = settled {
            lp.schedule(move || reaction(outcome));
        }
    }

    /// Derives a promise from both settlement paths.
    ///
    /// `on_fulfilled` runs on fulfilment, `on_rejected` on rejection; either
    /// handler's [`Step`] settles the returned promise. A handler that fails
    /// rejects the derived promise; one that chains another awaitable hands
    /// the settlement over to it.
    pub fn then<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Step<U> + 'static,
        G: FnOnce(LoopError) -> Step<U> + 'static,
    {
        let (child, resolver) = Promise::deferred(&self.event_loop());
        self.register(Box::new(move |outcome| {
            let step = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            resolver.apply(step);
            Ok(())
        }));
        child
    }

    /// Like [`Promise::then`] with rejection passing through untouched.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Step<U> + 'static,
    {
        self.then(on_fulfilled, Step::Fail)
    }

    /// Like [`Promise::then`] with fulfilment passing through untouched.
    pub fn or_else<G>(&self, on_rejected: G) -> Promise<T>
    where
        G: FnOnce(LoopError) -> Step<T> + 'static,
    {
        self.then(Step::Done, on_rejected)
    }

    /// Terminal sink: consumes the settlement without deriving a promise.
    ///
    /// There is no further consumer to deliver a handler failure to, so a
    /// handler returning `Err` escalates out of `EventLoop::run` as a
    /// loop-level fatal.
    pub fn done<F, G>(&self, on_fulfilled: F, on_rejected: G)
    where
        F: FnOnce(T) -> Result<(), LoopError> + 'static,
        G: FnOnce(LoopError) -> Result<(), LoopError> + 'static,
    {
        self.register(Box::new(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        }));
    }

    /// Cancels a pending promise.
    ///
    /// Transitions to `Rejected(Cancelled)`, generating a default reason if
    /// none is given, then runs the registered cleanup action. Idempotent
    /// on settled promises and suppressed on `uncancellable()` wrappers.
    /// Cancellation is advisory: it never interrupts in-flight producer
    /// work, and it never touches the source a derived promise came from.
    pub fn cancel(&self, reason: Option<LoopError>) {
        let cleanup = {
            let mut shared = self.shared.borrow_mut();
            if shared.guarded {
                log::debug!("cancel suppressed on uncancellable wrapper");
                return;
            }
            if !matches!(shared.state, State::Pending) {
                return;
            }
            shared.on_cancel.take()
        };

        let reason = reason.unwrap_or_else(LoopError::cancelled_default);
        log::debug!("awaitable cancelled: {reason}");
        settle(&self.shared, Err(reason));

        // Cleanup runs after the transition so it cannot race the
        // cancellation with a late fulfilment.
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    /// Blocking drain: runs the event loop until this promise settles, then
    /// returns the value or the rejection reason.
    ///
    /// Nests reentrantly inside an already-running loop; the suspension is
    /// cooperative, never an OS-thread wait. Fails with
    /// [`LoopError::Stalled`] when the loop goes idle first, since the
    /// settlement can no longer happen.
    pub fn wait(&self) -> Result<T, LoopError> {
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }

            let completed = self.event_loop().run()?;

            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            if completed {
                return Err(LoopError::Stalled);
            }
            // Stopped mid-drain with work remaining: keep running.
        }
    }

    /// Marks this promise as protected from consumer cancellation.
    pub(crate) fn guard(&self) {
        self.shared.borrow_mut().guarded = true;
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Fulfils the promise. A no-op once settled.
    pub fn fulfill(&self, value: T) {
        settle(&self.shared, Ok(value));
    }

    /// Rejects the promise. A no-op once settled.
    pub fn reject(&self, reason: LoopError) {
        settle(&self.shared, Err(reason));
    }

    /// Rejects with an arbitrary non-error payload, wrapped with a
    /// descriptive summary of the value.
    pub fn reject_with(&self, payload: impl std::fmt::Display) {
        self.reject(LoopError::wrap(payload));
    }

    /// Settles from a ready outcome.
    pub fn settle(&self, outcome: Result<T, LoopError>) {
        settle(&self.shared, outcome);
    }

    /// Adopts `source`'s settlement, whenever it happens.
    ///
    /// Resolving an awaitable with itself is a cycle that could never
    /// settle, so it fails with an argument error.
    pub fn follow(&self, source: &Promise<T>) -> Result<(), LoopError> {
        if Rc::ptr_eq(&self.shared, &source.shared) {
            return Err(LoopError::InvalidArgument(
                "an awaitable cannot be resolved with itself".into(),
            ));
        }

        let resolver = self.clone();
        source.register(Box::new(move |outcome| {
            resolver.settle(outcome);
            Ok(())
        }));
        Ok(())
    }

    /// Applies a handler's [`Step`] to this resolver.
    pub fn apply(&self, step: Step<T>) {
        match step {
            Step::Done(value) => self.fulfill(value),
            Step::Fail(reason) => self.reject(reason),
            Step::Chain(source) => {
                if let Err(error) = self.follow(&source) {
                    self.reject(error);
                }
            }
        }
    }

    /// Registers the cleanup action run if the promise is cancelled.
    ///
    /// The action is the sole mechanism for releasing producer resources on
    /// cancel; it is dropped unrun once the promise settles normally.
    pub fn on_cancel(&self, action: impl FnOnce() + 'static) {
        let mut shared = self.shared.borrow_mut();
        if matches!(shared.state, State::Pending) {
            shared.on_cancel = Some(Box::new(action));
        }
    }

    /// Whether the promise is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(self.shared.borrow().state, State::Pending)
    }
}

/// The one place state changes: first settlement wins, reactions drain in
/// registration order through the loop, and the cleanup action is dropped.
fn settle<T: Clone + 'static>(shared: &Rc<RefCell<Shared<T>>>, outcome: Result<T, LoopError>) {
    let (reactions, lp) = {
        let mut shared = shared.borrow_mut();
        if !matches!(shared.state, State::Pending) {
            return;
        }
        shared.state = match &outcome {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(reason) => State::Rejected(reason.clone()),
        };
        shared.on_cancel = None;
        (mem::take(&mut shared.reactions), shared.lp.clone())
    };

    for reaction in reactions {
        let outcome = outcome.clone();
        lp.schedule(move || reaction(outcome));
    }
}
