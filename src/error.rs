//! Error taxonomy shared by the loop, the awaitable engine and the emit queue.
//!
//! Every failure in this crate is a [`LoopError`]. Rejection reasons settle
//! awaitables, so the type is `Clone`: a settled reason may be delivered to
//! any number of consumers. Foreign payloads that are not errors themselves
//! are wrapped with a descriptive summary via [`LoopError::wrap`].

use std::fmt;

/// Unified error type for the runtime.
///
/// Groups four families of failures:
/// - argument errors (`InvalidArgument`),
/// - resource-state errors (`ResourceBusy`, `HandleFreed`, `SignalsDisabled`),
/// - settlement reasons (`Cancelled`, `TimedOut`, `Aggregate`, `Wrapped`),
/// - backpressure errors (`QueueBusy`, `AutoDisposed`).
///
/// `Backend` carries poll-backend failures and `Stalled` reports a blocking
/// drain whose event loop ran out of work first.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoopError {
    /// A malformed call, such as a zero-period periodic timer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A watch already exists for this (resource, direction) pair.
    #[error("resource is already being watched for this direction")]
    ResourceBusy,

    /// The watch handle was freed; no further operations are possible.
    #[error("watch handle has been freed")]
    HandleFreed,

    /// Signal watches require `LoopBuilder::enable_signals()`.
    #[error("signal handling is disabled for this event loop")]
    SignalsDisabled,

    /// The awaitable was cancelled before the producer settled it.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A `timeout` wrapper expired before its source settled.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// Every input of an `any`/`some` combinator rejected; reasons are kept
    /// in input order.
    #[error("all awaitables rejected ({} reasons)", .0.len())]
    Aggregate(Vec<LoopError>),

    /// A non-error rejection payload, wrapped with a descriptive summary.
    #[error("{0}")]
    Wrapped(String),

    /// `push` was called while the previous push was unacknowledged.
    #[error("emit queue is busy: previous push not yet acknowledged")]
    QueueBusy,

    /// The emit queue lost its last subscriber while non-terminal.
    #[error("emit queue auto-disposed: all subscribers unsubscribed")]
    AutoDisposed,

    /// A blocking drain could not finish: the loop went idle with the
    /// awaitable still pending.
    #[error("event loop ran out of work before settlement")]
    Stalled,

    /// The poll backend failed.
    #[error("poll backend failure: {0}")]
    Backend(String),
}

impl LoopError {
    /// Wraps an arbitrary non-error rejection payload.
    ///
    /// The payload is rendered once into a descriptive summary so consumers
    /// see what kind of value rejected them without runtime type dispatch.
    pub fn wrap(payload: impl fmt::Display) -> Self {
        LoopError::Wrapped(format!("rejected with non-error value: {payload}"))
    }

    /// Default reason used by `cancel()` when the caller gives none.
    pub(crate) fn cancelled_default() -> Self {
        LoopError::Cancelled("awaitable cancelled".into())
    }

    /// Converts the errno left behind by a failed syscall.
    pub(crate) fn from_errno(operation: &str, errno: i32) -> Self {
        let detail = std::io::Error::from_raw_os_error(errno);
        LoopError::Backend(format!("{operation}: {detail}"))
    }
}
