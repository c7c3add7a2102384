//! Combinators over collections of awaitables.
//!
//! None of these cancel the inputs that lost: once the outcome is decided,
//! remaining awaitables keep running and settle on their own.

use crate::error::LoopError;
use crate::promise::core::Promise;
use crate::runtime::EventLoop;

use std::cell::RefCell;
use std::rc::Rc;

/// Fulfils with every input's value, in input order, once all inputs
/// fulfil. Rejects as soon as any input rejects, without waiting for the
/// rest. An empty list fulfils immediately with an empty vector.
pub fn all<T: Clone + 'static>(lp: &EventLoop, inputs: Vec<Promise<T>>) -> Promise<Vec<T>> {
    let (result, resolver) = Promise::deferred(lp);
    let total = inputs.len();
    if total == 0 {
        resolver.fulfill(Vec::new());
        return result;
    }

    struct Gathering<T> {
        slots: Vec<Option<T>>,
        remaining: usize,
    }
    let state = Rc::new(RefCell::new(Gathering {
        slots: (0..total).map(|_| None).collect(),
        remaining: total,
    }));

    for (position, input) in inputs.into_iter().enumerate() {
        let state = state.clone();
        let resolver = resolver.clone();
        input.register(Box::new(move |outcome| {
            match outcome {
                Ok(value) => {
                    let mut state = state.borrow_mut();
                    state.slots[position] = Some(value);
                    state.remaining -= 1;
                    if state.remaining == 0 {
                        let values = state.slots.iter_mut().map(|slot| {
                            slot.take().expect("every slot filled when remaining is zero")
                        });
                        let values: Vec<T> = values.collect();
                        drop(state);
                        resolver.fulfill(values);
                    }
                }
                Err(reason) => resolver.reject(reason),
            }
            Ok(())
        }));
    }

    result
}

/// Fulfils with the first fulfilment. Rejects only when every input
/// rejected, with the reasons aggregated in input order.
pub fn any<T: Clone + 'static>(lp: &EventLoop, inputs: Vec<Promise<T>>) -> Promise<T> {
    let (result, resolver) = Promise::deferred(lp);
    let total = inputs.len();
    if total == 0 {
        resolver.reject(LoopError::Aggregate(Vec::new()));
        return result;
    }

    struct Rejections {
        reasons: Vec<Option<LoopError>>,
        remaining: usize,
    }
    let state = Rc::new(RefCell::new(Rejections {
        reasons: (0..total).map(|_| None).collect(),
        remaining: total,
    }));

    for (position, input) in inputs.into_iter().enumerate() {
        let state = state.clone();
        let resolver = resolver.clone();
        input.register(Box::new(move |outcome| {
            match outcome {
                Ok(value) => resolver.fulfill(value),
                Err(reason) => {
                    let mut state = state.borrow_mut();
                    state.reasons[position] = Some(reason);
                    state.remaining -= 1;
                    if state.remaining == 0 {
                        let reasons = state.reasons.iter_mut().map(|slot| {
                            slot.take().expect("every reason set when remaining is zero")
                        });
                        let reasons: Vec<LoopError> = reasons.collect();
                        drop(state);
                        resolver.reject(LoopError::Aggregate(reasons));
                    }
                }
            }
            Ok(())
        }));
    }

    result
}

/// Settles identically to whichever input settles first.
///
/// An empty race could never settle and would stall any blocking drain, so
/// it rejects with an argument error instead.
pub fn race<T: Clone + 'static>(lp: &EventLoop, inputs: Vec<Promise<T>>) -> Promise<T> {
    let (result, resolver) = Promise::deferred(lp);
    if inputs.is_empty() {
        resolver.reject(LoopError::InvalidArgument(
            "race requires at least one awaitable".into(),
        ));
        return result;
    }

    for input in inputs {
        let resolver = resolver.clone();
        input.register(Box::new(move |outcome| {
            resolver.settle(outcome);
            Ok(())
        }));
    }

    result
}

/// Fulfils with the first `count` fulfilments, in arrival order. Rejects
/// with the aggregated reasons once too many inputs rejected for `count`
/// fulfilments to remain possible.
pub fn some<T: Clone + 'static>(
    lp: &EventLoop,
    inputs: Vec<Promise<T>>,
    count: usize,
) -> Promise<Vec<T>> {
    let (result, resolver) = Promise::deferred(lp);
    let total = inputs.len();
    if count > total {
        resolver.reject(LoopError::InvalidArgument(format!(
            "cannot take {count} fulfilments from {total} awaitables"
        )));
        return result;
    }
    if count == 0 {
        resolver.fulfill(Vec::new());
        return result;
    }

    struct Tally<T> {
        values: Vec<T>,
        reasons: Vec<LoopError>,
        pending: usize,
    }
    let state = Rc::new(RefCell::new(Tally {
        values: Vec::new(),
        reasons: Vec::new(),
        pending: total,
    }));

    for input in inputs {
        let state = state.clone();
        let resolver = resolver.clone();
        input.register(Box::new(move |outcome| {
            let mut state = state.borrow_mut();
            state.pending -= 1;
            match outcome {
                Ok(value) => {
                    state.values.push(value);
                    if state.values.len() == count {
                        let values = std::mem::take(&mut state.values);
                        drop(state);
                        resolver.fulfill(values);
                    }
                }
                Err(reason) => {
                    state.reasons.push(reason);
                    if state.values.len() + state.pending < count {
                        let reasons = std::mem::take(&mut state.reasons);
                        drop(state);
                        resolver.reject(LoopError::Aggregate(reasons));
                    }
                }
            }
            Ok(())
        }));
    }

    result
}
