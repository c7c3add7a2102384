//! Event loop subsystem modules.

mod core;
pub(crate) mod timers;

pub use core::EventLoop;
pub use timers::TimerHandle;
