//! Backpressured emission queue: one producer, N consumers, exactly one
//! value in flight.
//!
//! The producer `push`es into the current [`Gate`], the placeholder every
//! consumer has `pull`ed for the next value, and the returned awaitable
//! stays pending until each of those consumers acknowledges with
//! [`Gate::ready`]. A slow consumer therefore backpressures the producer
//! instead of growing an unbounded buffer.

use crate::error::LoopError;
use crate::promise::{Promise, Resolver};
use crate::runtime::EventLoop;

use std::cell::RefCell;
use std::rc::Rc;

/// What a gate's awaitable carries: the next value, or the completion of
/// the whole sequence (optionally with a final value).
#[derive(Debug, Clone, PartialEq)]
pub enum Emission<T> {
    Item(T),
    Closed(Option<T>),
}

/// How the queue ended.
enum Terminal {
    Completed,
    Failed(LoopError),
    Disposed,
}

impl Terminal {
    /// Reason delivered to a push on a terminal queue.
    fn push_reason(&self) -> LoopError {
        match self {
            Terminal::Completed => {
                LoopError::InvalidArgument("push on a completed emit queue".into())
            }
            Terminal::Failed(reason) => reason.clone(),
            Terminal::Disposed => LoopError::AutoDisposed,
        }
    }
}

struct GateShared<T> {
    value: Promise<Emission<T>>,
    value_resolver: Resolver<Emission<T>>,
    ack: Promise<()>,
    ack_resolver: Resolver<()>,
    /// Consumers that pulled this gate and have not called `ready` yet.
    waiting: usize,
    /// Whether the producer has emitted into this gate.
    emitted: bool,
}

/// Placeholder for the next value of an [`EmitQueue`].
///
/// Consumers observe the value through [`Gate::value`] and must call
/// [`Gate::ready`] exactly once afterwards to release the producer.
pub struct Gate<T> {
    shared: Rc<RefCell<GateShared<T>>>,
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + 'static> Gate<T> {
    fn new(lp: &EventLoop) -> Self {
        let (value, value_resolver) = Promise::deferred(lp);
        let (ack, ack_resolver) = Promise::deferred(lp);
        Self {
            shared: Rc::new(RefCell::new(GateShared {
                value,
                value_resolver,
                ack,
                ack_resolver,
                waiting: 0,
                emitted: false,
            })),
        }
    }

    /// The awaitable delivering this gate's value or termination.
    pub fn value(&self) -> Promise<Emission<T>> {
        self.shared.borrow().value.clone()
    }

    /// Acknowledges this gate's value. Decrements the wait counter; the
    /// producer's push resolves when it reaches zero.
    pub fn ready(&self) {
        let resolve = {
            let mut shared = self.shared.borrow_mut();
            shared.waiting = shared.waiting.saturating_sub(1);
            shared.waiting == 0 && shared.emitted
        };
        if resolve {
            let resolver = self.shared.borrow().ack_resolver.clone();
            resolver.fulfill(());
        }
    }

    fn pulled(&self) {
        self.shared.borrow_mut().waiting += 1;
    }

    fn emit(&self, outcome: Result<Emission<T>, LoopError>) {
        let (value_resolver, resolve_ack) = {
            let mut shared = self.shared.borrow_mut();
            shared.emitted = true;
            (shared.value_resolver.clone(), shared.waiting == 0)
        };
        value_resolver.settle(outcome);
        if resolve_ack {
            // Nobody pulled this gate: the push is acknowledged at once.
            let resolver = self.shared.borrow().ack_resolver.clone();
            resolver.fulfill(());
        }
    }

    fn ack(&self) -> Promise<()> {
        self.shared.borrow().ack.clone()
    }

    fn force_ack(&self, outcome: Result<(), LoopError>) {
        let resolver = self.shared.borrow().ack_resolver.clone();
        resolver.settle(outcome);
    }
}

struct QueueShared<T> {
    lp: EventLoop,
    current: Gate<T>,
    /// Gate emitted by the unacknowledged push, if any.
    inflight: Option<Gate<T>>,
    listeners: usize,
    busy: bool,
    terminal: Option<Terminal>,
}

/// Multi-consumer backpressure handshake over a push-based producer.
///
/// # Example
/// ```ignore
/// let queue = EmitQueue::new(&lp);
/// queue.increment();
/// let gate = queue.pull();
/// gate.value().done(
///     |emission| { /* consume */ Ok(()) },
///     |reason| Err(reason),
/// );
/// let delivered = queue.push(1); // settles once the gate is ready()
/// gate.ready();
/// ```
pub struct EmitQueue<T> {
    shared: Rc<RefCell<QueueShared<T>>>,
}

impl<T> Clone for EmitQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + 'static> EmitQueue<T> {
    /// Creates a queue with no subscribers and an empty first gate.
    pub fn new(lp: &EventLoop) -> Self {
        Self {
            shared: Rc::new(RefCell::new(QueueShared {
                lp: lp.clone(),
                current: Gate::new(lp),
                inflight: None,
                listeners: 0,
                busy: false,
                terminal: None,
            })),
        }
    }

    /// Pulls the placeholder for the next value, incrementing its wait
    /// counter. The caller must call [`Gate::ready`] on it exactly once
    /// after observing the value.
    pub fn pull(&self) -> Gate<T> {
        let gate = self.shared.borrow().current.clone();
        gate.pulled();
        gate
    }

    /// Emits one value.
    ///
    /// Fails with [`LoopError::QueueBusy`] while a prior push is
    /// unacknowledged: the producer is cooperative and must await the
    /// previous push first. Otherwise resolves the current gate with the
    /// value, installs a fresh gate for the next one, and returns an
    /// awaitable that fulfils once every consumer that pulled the resolved
    /// gate has called `ready()`.
    pub fn push(&self, value: T) -> Promise<()> {
        let gate = {
            let mut queue = self.shared.borrow_mut();
            let lp = queue.lp.clone();
            if let Some(terminal) = &queue.terminal {
                return Promise::rejected(&lp, terminal.push_reason());
            }
            if queue.busy {
                return Promise::rejected(&lp, LoopError::QueueBusy);
            }

            queue.busy = true;
            let fresh = Gate::new(&lp);
            let gate = std::mem::replace(&mut queue.current, fresh);
            queue.inflight = Some(gate.clone());
            gate
        };

        gate.emit(Ok(Emission::Item(value)));

        // Registered before the caller can register on the returned
        // awaitable, so the queue is un-busied before the producer resumes.
        let shared = self.shared.clone();
        let ack = gate.ack();
        ack.register(Box::new(move |_outcome| {
            let mut queue = shared.borrow_mut();
            queue.busy = false;
            queue.inflight = None;
            Ok(())
        }));

        ack
    }

    /// Ends the sequence successfully, optionally with a final value.
    /// Idempotent after the first terminal call; unblocks any outstanding
    /// push (its value was delivered).
    pub fn complete(&self, value: Option<T>) {
        self.terminate(Terminal::Completed, Ok(Emission::Closed(value)), Ok(()));
    }

    /// Ends the sequence with a failure. Idempotent after the first
    /// terminal call; unblocks any outstanding push.
    pub fn fail(&self, reason: LoopError) {
        self.terminate(Terminal::Failed(reason.clone()), Err(reason), Ok(()));
    }

    /// Adds a subscriber.
    pub fn increment(&self) {
        self.shared.borrow_mut().listeners += 1;
    }

    /// Removes a subscriber. Reaching zero while non-terminal disposes the
    /// queue: the current gate and any in-flight push observe a
    /// distinguished auto-disposed reason, exactly once.
    pub fn decrement(&self) {
        let dispose = {
            let mut queue = self.shared.borrow_mut();
            queue.listeners = queue.listeners.saturating_sub(1);
            queue.listeners == 0 && queue.terminal.is_none()
        };
        if dispose {
            log::debug!("emit queue auto-disposed: last subscriber left");
            self.terminate(
                Terminal::Disposed,
                Err(LoopError::AutoDisposed),
                Err(LoopError::AutoDisposed),
            );
        }
    }

    /// Current subscriber count.
    pub fn listeners(&self) -> usize {
        self.shared.borrow().listeners
    }

    /// Whether a terminal call has been made.
    pub fn is_terminal(&self) -> bool {
        self.shared.borrow().terminal.is_some()
    }

    fn terminate(
        &self,
        terminal: Terminal,
        gate_outcome: Result<Emission<T>, LoopError>,
        push_outcome: Result<(), LoopError>,
    ) {
        let (current, inflight) = {
            let mut queue = self.shared.borrow_mut();
            if queue.terminal.is_some() {
                return;
            }
            queue.terminal = Some(terminal);
            (queue.current.clone(), queue.inflight.take())
        };

        current.emit(gate_outcome);
        if let Some(inflight) = inflight {
            inflight.force_ack(push_outcome);
        }
    }
}
