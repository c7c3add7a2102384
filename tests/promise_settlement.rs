use evloop::{EventLoop, LoopError, Promise, Step};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn first_settlement_wins_and_later_attempts_are_noops() {
    let lp = EventLoop::new();
    let (promise, resolver) = Promise::deferred(&lp);
    let deliveries = Rc::new(Cell::new(0u32));

    let counted = deliveries.clone();
    promise.done(
        move |value| {
            assert_eq!(value, 1);
            counted.set(counted.get() + 1);
            Ok(())
        },
        |reason| Err(reason),
    );

    resolver.fulfill(1);
    resolver.fulfill(2);
    resolver.reject(LoopError::Wrapped("too late".into()));
    promise.cancel(None);

    assert!(lp.run().unwrap());
    assert_eq!(deliveries.get(), 1, "exactly one delivery after settlement");
    assert_eq!(promise.outcome(), Some(Ok(1)), "state is immutable once settled");
}

#[test]
fn reactions_deliver_in_registration_order() {
    let lp = EventLoop::new();
    let (promise, resolver) = Promise::deferred(&lp);
    let order = Rc::new(RefCell::new(Vec::new()));

    for name in ["h1", "h2", "h3"] {
        let order = order.clone();
        promise.done(
            move |value| {
                order.borrow_mut().push((name, value));
                Ok(())
            },
            |reason| Err(reason),
        );
    }

    resolver.fulfill(7);
    assert!(lp.run().unwrap());
    assert_eq!(*order.borrow(), vec![("h1", 7), ("h2", 7), ("h3", 7)]);
}

#[test]
fn delivery_is_deferred_even_when_already_settled() {
    let lp = EventLoop::new();
    let promise = Promise::fulfilled(&lp, 5);
    let delivered = Rc::new(Cell::new(false));

    let marker = delivered.clone();
    promise.done(
        move |_| {
            marker.set(true);
            Ok(())
        },
        |reason| Err(reason),
    );

    assert!(!delivered.get(), "reaction must not run synchronously");
    assert!(lp.run().unwrap());
    assert!(delivered.get());
}

#[test]
fn then_chains_and_unwraps_returned_awaitables() {
    let lp = EventLoop::new();
    let (source, resolver) = Promise::deferred(&lp);

    let chained = {
        let lp = lp.clone();
        source.and_then(move |value: i32| {
            // Chain onto another awaitable settled by a timer.
            let (inner, inner_resolver) = Promise::deferred(&lp);
            lp.timer(Duration::from_millis(5), false, move || {
                inner_resolver.fulfill(value * 2);
                Ok(())
            })
            .map(|_| Step::Chain(inner))
            .unwrap_or_else(Step::Fail)
        })
    };

    resolver.fulfill(21);
    assert_eq!(chained.wait().unwrap(), 42);
}

#[test]
fn handler_failure_becomes_the_derived_rejection() {
    let lp = EventLoop::new();
    let source = Promise::fulfilled(&lp, 1);

    let derived: Promise<i32> =
        source.and_then(|_| Step::Fail(LoopError::Wrapped("handler blew up".into())));

    assert_eq!(
        derived.wait().unwrap_err(),
        LoopError::Wrapped("handler blew up".into())
    );
    assert_eq!(source.outcome(), Some(Ok(1)), "the source is untouched");
}

#[test]
fn or_else_recovers_from_a_rejection() {
    let lp = EventLoop::new();
    let source: Promise<i32> = Promise::rejected(&lp, LoopError::Wrapped("original".into()));

    let recovered = source.or_else(|reason| {
        assert_eq!(reason, LoopError::Wrapped("original".into()));
        Step::Done(99)
    });

    assert_eq!(recovered.wait().unwrap(), 99);
}

#[test]
fn missing_handler_passes_the_original_reason_through() {
    let lp = EventLoop::new();
    let source: Promise<i32> = Promise::rejected(&lp, LoopError::Wrapped("pass through".into()));

    let derived = source.and_then(|value| Step::Done(value + 1));

    assert_eq!(
        derived.wait().unwrap_err(),
        LoopError::Wrapped("pass through".into())
    );
}

#[test]
fn done_handler_failure_escalates_out_of_run() {
    let lp = EventLoop::new();
    let promise = Promise::fulfilled(&lp, 3);

    promise.done(
        |_| Err(LoopError::Wrapped("terminal sink failure".into())),
        |reason| Err(reason),
    );

    let error = lp.run().unwrap_err();
    assert_eq!(error, LoopError::Wrapped("terminal sink failure".into()));
    assert!(lp.run().unwrap(), "the loop remains usable afterwards");
}

#[test]
fn cancel_rejects_with_provenance_and_runs_cleanup() {
    let lp = EventLoop::new();
    let (promise, resolver) = Promise::<i32>::deferred(&lp);
    let cleaned = Rc::new(Cell::new(0u32));

    let marker = cleaned.clone();
    resolver.on_cancel(move || marker.set(marker.get() + 1));

    promise.cancel(None);
    promise.cancel(None); // idempotent

    assert!(matches!(promise.outcome(), Some(Err(LoopError::Cancelled(_)))));
    assert_eq!(cleaned.get(), 1, "cleanup action runs exactly once");

    resolver.fulfill(1);
    assert!(
        matches!(promise.outcome(), Some(Err(LoopError::Cancelled(_)))),
        "a late fulfilment cannot overwrite the cancellation"
    );
}

#[test]
fn cancel_with_an_explicit_reason_keeps_it() {
    let lp = EventLoop::new();
    let (promise, _resolver) = Promise::<i32>::deferred(&lp);

    promise.cancel(Some(LoopError::Cancelled("shutdown".into())));
    assert_eq!(
        promise.outcome(),
        Some(Err(LoopError::Cancelled("shutdown".into())))
    );
}

#[test]
fn cancelling_a_derived_promise_leaves_the_source_alone() {
    let lp = EventLoop::new();
    let (source, resolver) = Promise::<i32>::deferred(&lp);
    let derived = source.and_then(|value| Step::Done(value + 1));

    derived.cancel(None);

    assert!(!source.is_settled(), "cancellation must not travel upstream");
    resolver.fulfill(1);
    assert_eq!(source.outcome(), Some(Ok(1)));
    assert!(
        matches!(derived.outcome(), Some(Err(LoopError::Cancelled(_)))),
        "the derived promise keeps its cancellation"
    );
}

#[test]
fn resolving_an_awaitable_with_itself_is_an_argument_error() {
    let lp = EventLoop::new();
    let (promise, resolver) = Promise::<i32>::deferred(&lp);

    let error = resolver.follow(&promise).unwrap_err();
    assert!(matches!(error, LoopError::InvalidArgument(_)));
    assert!(!promise.is_settled());
}

#[test]
fn non_error_rejection_payloads_are_wrapped_descriptively() {
    let lp = EventLoop::new();
    let (promise, resolver) = Promise::<i32>::deferred(&lp);

    resolver.reject_with(42);

    match promise.outcome() {
        Some(Err(LoopError::Wrapped(summary))) => {
            assert!(summary.contains("42"), "summary should describe the payload")
        }
        other => panic!("expected a wrapped rejection, got {other:?}"),
    }
}

#[test]
fn wait_returns_the_value_once_the_loop_settles_it() {
    let lp = EventLoop::new();
    let (promise, resolver) = Promise::deferred(&lp);

    lp.timer(Duration::from_millis(5), false, move || {
        resolver.fulfill("ready");
        Ok(())
    })
    .unwrap();

    assert_eq!(promise.wait().unwrap(), "ready");
}

#[test]
fn wait_fails_when_the_loop_runs_out_of_work() {
    let lp = EventLoop::new();
    let (promise, _resolver) = Promise::<i32>::deferred(&lp);

    // Nothing will ever settle this promise: the loop goes idle at once.
    assert_eq!(promise.wait().unwrap_err(), LoopError::Stalled);
}

#[test]
fn wait_nests_reentrantly_inside_a_running_loop() {
    let lp = EventLoop::new();
    let (outer, outer_resolver) = Promise::deferred(&lp);

    let handle = lp.clone();
    lp.schedule(move || {
        let (inner, inner_resolver) = Promise::deferred(&handle);
        handle.timer(Duration::from_millis(5), false, move || {
            inner_resolver.fulfill(7);
            Ok(())
        })?;

        // Blocking drain from inside a callback: re-enters the loop.
        let value = inner.wait()?;
        outer_resolver.fulfill(value);
        Ok(())
    });

    assert_eq!(outer.wait().unwrap(), 7);
}
