use evloop::promise::all;
use evloop::{Drive, EventLoop, LoopError, Promise, Ran, Resumable, drive, execute};

use std::time::Duration;

/// Awaits each queued promise in turn and accumulates the values.
struct SumInputs {
    inputs: Vec<Promise<i32>>,
    total: i32,
}

impl SumInputs {
    fn new(mut inputs: Vec<Promise<i32>>) -> Self {
        inputs.reverse(); // pop() then yields in the original order
        Self { inputs, total: 0 }
    }
}

impl Resumable for SumInputs {
    type Item = i32;
    type Output = i32;

    fn resume(&mut self, input: Result<Option<i32>, LoopError>) -> Drive<i32, i32> {
        match input {
            Ok(Some(value)) => self.total += value,
            Ok(None) => {}
            Err(reason) => return Drive::Fail(reason),
        }
        match self.inputs.pop() {
            Some(next) => Drive::Await(next),
            None => Drive::Finish(self.total),
        }
    }
}

/// Recovers from an injected rejection with a fallback value.
struct Recovering {
    source: Option<Promise<i32>>,
}

impl Resumable for Recovering {
    type Item = i32;
    type Output = i32;

    fn resume(&mut self, input: Result<Option<i32>, LoopError>) -> Drive<i32, i32> {
        match input {
            Ok(None) => Drive::Await(self.source.take().expect("yield once")),
            Ok(Some(value)) => Drive::Finish(value),
            Err(_) => Drive::Finish(-1),
        }
    }
}

fn fulfil_after(lp: &EventLoop, delay_ms: u64, value: i32) -> Promise<i32> {
    let (promise, resolver) = Promise::deferred(lp);
    lp.timer(Duration::from_millis(delay_ms), false, move || {
        resolver.fulfill(value);
        Ok(())
    })
    .unwrap();
    promise
}

#[test]
fn driver_feeds_settled_values_back_into_the_machine() {
    let lp = EventLoop::new();
    let machine = SumInputs::new(vec![
        fulfil_after(&lp, 5, 1),
        fulfil_after(&lp, 1, 2),
        fulfil_after(&lp, 3, 4),
    ]);

    let total = drive(&lp, machine);
    assert_eq!(total.wait().unwrap(), 7);
}

#[test]
fn driver_injects_rejections_for_the_machine_to_handle() {
    let lp = EventLoop::new();
    let machine = Recovering {
        source: Some(Promise::rejected(
            &lp,
            LoopError::Wrapped("yielded awaitable failed".into()),
        )),
    };

    let result = drive(&lp, machine);
    assert_eq!(result.wait().unwrap(), -1, "the machine recovered");
}

#[test]
fn unhandled_machine_failure_rejects_the_driver_promise() {
    let lp = EventLoop::new();
    let machine = SumInputs::new(vec![Promise::rejected(
        &lp,
        LoopError::Wrapped("no recovery".into()),
    )]);

    let result = drive(&lp, machine);
    assert_eq!(
        result.wait().unwrap_err(),
        LoopError::Wrapped("no recovery".into())
    );
}

#[test]
fn driven_coroutines_compose_with_combinators() {
    let lp = EventLoop::new();

    let driven = drive(&lp, SumInputs::new(vec![fulfil_after(&lp, 2, 40)]));
    let plain = fulfil_after(&lp, 5, 2);

    let gathered = all(&lp, vec![driven, plain]);
    assert_eq!(gathered.wait().unwrap(), vec![40, 2]);
}

#[test]
fn execute_wraps_a_plain_value() {
    let value = execute(|_lp| Ran::Value(123)).unwrap();
    assert_eq!(value, 123);
}

#[test]
fn execute_runs_the_loop_until_the_awaitable_settles() {
    let value = execute(|lp| {
        let (promise, resolver) = Promise::deferred(lp);
        lp.timer(Duration::from_millis(5), false, move || {
            resolver.fulfill("settled");
            Ok(())
        })
        .map(|_| Ran::Awaitable(promise))
        .unwrap_or_else(|error| Ran::Awaitable(Promise::rejected(lp, error)))
    })
    .unwrap();

    assert_eq!(value, "settled");
}

#[test]
fn execute_propagates_rejections_as_errors() {
    let result: Result<i32, LoopError> = execute(|lp| {
        Ran::Awaitable(Promise::rejected(lp, LoopError::Wrapped("bad batch".into())))
    });

    assert_eq!(result.unwrap_err(), LoopError::Wrapped("bad batch".into()));
}

#[test]
fn execute_reports_a_stalled_result() {
    let result: Result<i32, LoopError> = execute(|lp| {
        let (promise, _resolver) = Promise::deferred(lp);
        Ran::Awaitable(promise)
    });

    assert_eq!(result.unwrap_err(), LoopError::Stalled);
}
