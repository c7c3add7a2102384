//! Resource event management: readiness multiplexing behind one contract.
//!
//! This module tracks watchable OS resources (file descriptors and signals)
//! and reports readiness or timeout to the event loop. It includes:
//! - [`manager`]: the `ResourceManager` contract the loop schedules against
//! - [`poll`]: the poll(2)-based backend
//! - [`signal`]: self-pipe signal delivery shared by backends

pub mod manager;
pub mod poll;
pub(crate) mod signal;

pub use manager::{Direction, Firing, Readiness, ResourceManager, WatchHandle};
pub use poll::PollManager;
