//! Single-threaded cooperative concurrency runtime.
//!
//! An event loop multiplexes I/O readiness, timers and OS signals; a
//! resolve-once awaitable engine provides chaining, cancellation and
//! combinators on top of it; and a backpressured emission queue turns the
//! same primitives into an asynchronous sequence with exactly one value in
//! flight.
//!
//! # Architecture
//!
//! - **EventLoop**: timer queue, immediate-callback queue, tick algorithm,
//!   idle/termination detection
//! - **ResourceManager**: watch lifecycle over interchangeable backends
//!   (the provided one is poll(2)-based)
//! - **Promise / Resolver**: deferred value with a strict resolution state
//!   machine, cancellation and combinators
//! - **EmitQueue / Gate**: one-at-a-time emission handshake giving
//!   backpressure without unbounded buffering
//! - **Resumable / drive**: coroutine driver advanced by settled awaitables
//! - **execute**: synchronous entry point running a fresh loop to completion
//!
//! Everything is single-threaded and cooperative: suspension always means
//! "register a callback for a future tick", so no locking primitives exist
//! anywhere in the crate.

mod builder;
mod coro;
mod emit;
mod error;
mod execute;
pub mod promise;
pub mod reactor;
mod runtime;

pub use builder::LoopBuilder;
pub use coro::{Drive, Resumable, drive};
pub use emit::{EmitQueue, Emission, Gate};
pub use error::LoopError;
pub use execute::{Ran, execute};
pub use promise::{Lazy, Promise, Resolver, Step};
pub use reactor::{Direction, Readiness, ResourceManager, WatchHandle};
pub use runtime::{EventLoop, TimerHandle};
