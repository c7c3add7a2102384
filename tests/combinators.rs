use evloop::promise::{all, any, race, some};
use evloop::{EventLoop, LoopError, Promise};

use std::time::Duration;

/// A promise fulfilled with `value` after `delay_ms`.
fn fulfil_after(lp: &EventLoop, delay_ms: u64, value: i32) -> Promise<i32> {
    let (promise, resolver) = Promise::deferred(lp);
    lp.timer(Duration::from_millis(delay_ms), false, move || {
        resolver.fulfill(value);
        Ok(())
    })
    .unwrap();
    promise
}

/// A promise rejected with a wrapped `label` after `delay_ms`.
fn reject_after(lp: &EventLoop, delay_ms: u64, label: &'static str) -> Promise<i32> {
    let (promise, resolver) = Promise::deferred(lp);
    lp.timer(Duration::from_millis(delay_ms), false, move || {
        resolver.reject(LoopError::Wrapped(label.into()));
        Ok(())
    })
    .unwrap();
    promise
}

#[test]
fn all_preserves_input_order_regardless_of_settlement_order() {
    let lp = EventLoop::new();

    // B settles well before A; the result must still be [1, 2].
    let a = fulfil_after(&lp, 20, 1);
    let b = fulfil_after(&lp, 5, 2);

    let gathered = all(&lp, vec![a, b]);
    assert_eq!(gathered.wait().unwrap(), vec![1, 2]);
}

#[test]
fn all_rejects_on_first_rejection_without_waiting() {
    let lp = EventLoop::new();

    let (never, _keep_pending) = Promise::<i32>::deferred(&lp);
    let failing = reject_after(&lp, 5, "x");

    let gathered = all(&lp, vec![never.clone(), failing]);
    assert_eq!(gathered.wait().unwrap_err(), LoopError::Wrapped("x".into()));
    assert!(!never.is_settled(), "siblings are not auto-cancelled");
}

#[test]
fn all_of_nothing_fulfils_immediately() {
    let lp = EventLoop::new();
    let gathered = all::<i32>(&lp, Vec::new());
    assert_eq!(gathered.wait().unwrap(), Vec::<i32>::new());
}

#[test]
fn any_takes_the_first_fulfilment() {
    let lp = EventLoop::new();

    let winner = any(
        &lp,
        vec![
            reject_after(&lp, 2, "early loss"),
            fulfil_after(&lp, 10, 10),
            fulfil_after(&lp, 30, 30),
        ],
    );

    assert_eq!(winner.wait().unwrap(), 10);
}

#[test]
fn any_aggregates_reasons_in_input_order() {
    let lp = EventLoop::new();

    // Arrival order differs from input order on purpose.
    let a = reject_after(&lp, 15, "a");
    let b = reject_after(&lp, 10, "b");
    let c = reject_after(&lp, 5, "c");

    let winner = any(&lp, vec![a, b, c]);
    assert_eq!(
        winner.wait().unwrap_err(),
        LoopError::Aggregate(vec![
            LoopError::Wrapped("a".into()),
            LoopError::Wrapped("b".into()),
            LoopError::Wrapped("c".into()),
        ])
    );
}

#[test]
fn race_settles_like_its_first_settler_either_way() {
    let lp = EventLoop::new();
    let fastest_wins = race(
        &lp,
        vec![fulfil_after(&lp, 5, 5), fulfil_after(&lp, 20, 20)],
    );
    assert_eq!(fastest_wins.wait().unwrap(), 5);

    let lp = EventLoop::new();
    let fastest_loses = race(
        &lp,
        vec![reject_after(&lp, 5, "first"), fulfil_after(&lp, 20, 20)],
    );
    assert_eq!(
        fastest_loses.wait().unwrap_err(),
        LoopError::Wrapped("first".into())
    );
}

#[test]
fn race_of_nothing_is_an_argument_error() {
    let lp = EventLoop::new();
    let empty = race::<i32>(&lp, Vec::new());
    assert!(matches!(empty.wait().unwrap_err(), LoopError::InvalidArgument(_)));
}

#[test]
fn some_fulfils_once_enough_fulfilments_accumulate() {
    let lp = EventLoop::new();

    let subset = some(
        &lp,
        vec![
            fulfil_after(&lp, 10, 1),
            reject_after(&lp, 2, "loss"),
            fulfil_after(&lp, 5, 3),
        ],
        2,
    );

    // Arrival order: 3 settles before 1.
    assert_eq!(subset.wait().unwrap(), vec![3, 1]);
}

#[test]
fn some_rejects_once_success_is_impossible() {
    let lp = EventLoop::new();

    let subset = some(
        &lp,
        vec![
            fulfil_after(&lp, 5, 1),
            reject_after(&lp, 2, "one"),
            reject_after(&lp, 8, "two"),
        ],
        2,
    );

    match subset.wait().unwrap_err() {
        LoopError::Aggregate(reasons) => assert_eq!(reasons.len(), 2),
        other => panic!("expected aggregated reasons, got {other:?}"),
    }
}

#[test]
fn some_asking_for_more_than_available_is_an_argument_error() {
    let lp = EventLoop::new();
    let impossible = some(&lp, vec![fulfil_after(&lp, 1, 1)], 2);
    assert!(matches!(
        impossible.wait().unwrap_err(),
        LoopError::InvalidArgument(_)
    ));
}
