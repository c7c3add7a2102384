//! Awaitable engine: deferred values, chaining, cancellation, combinators.

mod combinators;
mod core;
mod wrappers;

pub use combinators::{all, any, race, some};
pub use core::{Promise, Resolver, Step};
pub use wrappers::{Lazy, deferred_with_cleanup};
