//! poll(2)-based resource event manager.
//!
//! Watches live in a generation-stamped slot map; handles are (index,
//! generation) pairs so use-after-free is reported, never aliased. Each poll
//! assembles the `pollfd` set from armed watches, clamps the timeout against
//! watch-level listen deadlines, and reports firings back to the loop.

use crate::error::LoopError;
use crate::reactor::manager::{
    Direction, Firing, Readiness, ResourceManager, WatchCallback, WatchHandle,
};
use crate::reactor::signal::{SignalPipe, errno};

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Listen timeouts shorter than this are clamped up to it.
const MIN_LISTEN_TIMEOUT: Duration = Duration::from_millis(1);

/// One registered watch.
struct Watch {
    resource: RawFd,
    direction: Direction,
    callback: Option<WatchCallback>,
    armed: bool,
    deadline: Option<Instant>,
}

/// Slot-map entry; the generation bumps on every free.
struct Slot {
    generation: u32,
    watch: Option<Watch>,
}

/// Resource event manager built on poll(2).
///
/// Signal watches are delivered through a shared [`SignalPipe`] whose read
/// end joins the poll set whenever an armed signal watch exists.
pub struct PollManager {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    by_pair: HashMap<(RawFd, Direction), usize>,
    signals: Option<SignalPipe>,
    /// signal number -> slot index, for routing drained pipe bytes.
    by_signal: HashMap<i32, usize>,
}

impl PollManager {
    /// Creates a manager without signal support.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            by_pair: HashMap::new(),
            signals: None,
            by_signal: HashMap::new(),
        }
    }

    /// Creates a manager with the signal pipe installed.
    pub fn with_signals() -> Result<Self, LoopError> {
        let mut manager = Self::new();
        manager.signals = Some(SignalPipe::new()?);
        Ok(manager)
    }

    fn slot(&self, handle: WatchHandle) -> Result<&Watch, LoopError> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.watch.as_ref())
            .ok_or(LoopError::HandleFreed)
    }

    fn slot_mut(&mut self, handle: WatchHandle) -> Result<&mut Watch, LoopError> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.watch.as_mut())
            .ok_or(LoopError::HandleFreed)
    }

    /// True while at least one armed signal watch exists.
    fn signals_armed(&self) -> bool {
        self.by_signal
            .values()
            .any(|&index| matches!(&self.slots[index].watch, Some(w) if w.armed))
    }

    /// Converts a poll timeout, rounding partial milliseconds up so short
    /// waits never spin.
    fn timeout_ms(timeout: Option<Duration>) -> i32 {
        match timeout {
            None => -1,
            Some(duration) => {
                let mut ms = duration.as_millis().min(i32::MAX as u128 - 1) as i32;
                if Duration::from_millis(ms as u64) < duration {
                    ms += 1;
                }
                ms
            }
        }
    }
}

impl Default for PollManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager for PollManager {
    fn create(
        &mut self,
        resource: RawFd,
        direction: Direction,
        callback: WatchCallback,
    ) -> Result<WatchHandle, LoopError> {
        if direction == Direction::Signal && self.signals.is_none() {
            return Err(LoopError::SignalsDisabled);
        }
        if self.by_pair.contains_key(&(resource, direction)) {
            return Err(LoopError::ResourceBusy);
        }

        if direction == Direction::Signal {
            let pipe = self.signals.as_ref().ok_or(LoopError::SignalsDisabled)?;
            pipe.install(resource)?;
        }

        let watch = Watch {
            resource,
            direction,
            callback: Some(callback),
            armed: false,
            deadline: None,
        };

        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index].watch = Some(watch);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    watch: Some(watch),
                });
                self.slots.len() - 1
            }
        };

        self.by_pair.insert((resource, direction), index);
        if direction == Direction::Signal {
            self.by_signal.insert(resource, index);
        }

        log::debug!("watch created: resource {resource}, {direction:?}, slot {index}");
        Ok(WatchHandle {
            index,
            generation: self.slots[index].generation,
        })
    }

    fn listen(&mut self, handle: WatchHandle, timeout: Option<Duration>) -> Result<(), LoopError> {
        let watch = self.slot_mut(handle)?;
        watch.armed = true;
        watch.deadline = timeout.map(|t| Instant::now() + t.max(MIN_LISTEN_TIMEOUT));
        Ok(())
    }

    fn cancel(&mut self, handle: WatchHandle) -> Result<(), LoopError> {
        let watch = self.slot_mut(handle)?;
        watch.armed = false;
        watch.deadline = None;
        Ok(())
    }

    fn free(&mut self, handle: WatchHandle) -> Result<(), LoopError> {
        // Validate first so a stale handle reports HandleFreed.
        let (resource, direction) = {
            let watch = self.slot(handle)?;
            (watch.resource, watch.direction)
        };

        self.by_pair.remove(&(resource, direction));
        if direction == Direction::Signal {
            self.by_signal.remove(&resource);
            if let Some(pipe) = &self.signals {
                pipe.uninstall(resource);
            }
        }

        let slot = &mut self.slots[handle.index];
        slot.watch = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);

        log::debug!("watch freed: resource {resource}, {direction:?}");
        Ok(())
    }

    fn is_pending(&self, handle: WatchHandle) -> Result<bool, LoopError> {
        Ok(self.slot(handle)?.armed)
    }

    fn is_freed(&self, handle: WatchHandle) -> bool {
        self.slot(handle).is_err()
    }

    fn is_empty(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| !matches!(&slot.watch, Some(w) if w.armed))
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|slot| slot.watch.as_ref())
            .filter(|watch| watch.armed)
            .filter_map(|watch| watch.deadline)
            .min()
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Firing>, LoopError> {
        // Clamp against the nearest listen deadline so watch timeouts fire
        // even when the loop would block longer.
        let now = Instant::now();
        let effective = match (timeout, self.next_deadline()) {
            (requested, Some(deadline)) => {
                let until = deadline.saturating_duration_since(now);
                Some(requested.map_or(until, |r| r.min(until)))
            }
            (requested, None) => requested,
        };

        let mut fds: Vec<libc::pollfd> = Vec::new();
        let mut fd_slots: Vec<usize> = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(watch) = &slot.watch else { continue };
            if !watch.armed {
                continue;
            }
            let events = match watch.direction {
                Direction::Read => libc::POLLIN,
                Direction::Write => libc::POLLOUT,
                Direction::Signal => continue,
            };
            fds.push(libc::pollfd {
                fd: watch.resource,
                events,
                revents: 0,
            });
            fd_slots.push(index);
        }

        let pipe_index = if self.signals_armed() {
            let pipe = self.signals.as_ref().ok_or(LoopError::SignalsDisabled)?;
            fds.push(libc::pollfd {
                fd: pipe.read_end,
                events: libc::POLLIN,
                revents: 0,
            });
            Some(fds.len() - 1)
        } else {
            None
        };

        let rc = unsafe {
            libc::poll(
                fds.as_mut_ptr(),
                fds.len() as libc::nfds_t,
                Self::timeout_ms(effective),
            )
        };
        if rc < 0 {
            let err = errno();
            if err == libc::EINTR {
                return Ok(Vec::new());
            }
            return Err(LoopError::from_errno("poll", err));
        }

        let mut firings = Vec::new();
        let now = Instant::now();

        for (position, pollfd) in fds.iter().enumerate() {
            if Some(position) == pipe_index {
                if pollfd.revents & libc::POLLIN != 0 {
                    if let Some(pipe) = &self.signals {
                        for signo in pipe.drain() {
                            // Persistent watches: deliver without disarming.
                            if let Some(&index) = self.by_signal.get(&signo) {
                                let slot = &self.slots[index];
                                if matches!(&slot.watch, Some(w) if w.armed) {
                                    firings.push(Firing {
                                        handle: WatchHandle {
                                            index,
                                            generation: slot.generation,
                                        },
                                        readiness: Readiness::Signal(signo),
                                    });
                                }
                            }
                        }
                    }
                }
                continue;
            }

            // Error conditions surface as readiness so the caller's read or
            // write observes the underlying failure.
            let ready =
                pollfd.revents & (libc::POLLIN | libc::POLLOUT | libc::POLLERR | libc::POLLHUP)
                    != 0;
            if !ready {
                continue;
            }

            let index = fd_slots[position];
            let slot = &mut self.slots[index];
            let Some(watch) = slot.watch.as_mut() else {
                continue;
            };
            watch.armed = false;
            watch.deadline = None;

            firings.push(Firing {
                handle: WatchHandle {
                    index,
                    generation: slot.generation,
                },
                readiness: match watch.direction {
                    Direction::Read => Readiness::Readable,
                    Direction::Write => Readiness::Writable,
                    Direction::Signal => unreachable!("signal watches are not in the fd set"),
                },
            });
        }

        // Expired listen deadlines fire flagged as timed out.
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(watch) = slot.watch.as_mut() else {
                continue;
            };
            if !watch.armed {
                continue;
            }
            if let Some(deadline) = watch.deadline
                && deadline <= now
            {
                watch.armed = false;
                watch.deadline = None;
                firings.push(Firing {
                    handle: WatchHandle {
                        index,
                        generation: slot.generation,
                    },
                    readiness: Readiness::TimedOut,
                });
            }
        }

        Ok(firings)
    }

    fn take_callback(&mut self, handle: WatchHandle) -> Option<WatchCallback> {
        self.slot_mut(handle).ok().and_then(|w| w.callback.take())
    }

    fn restore_callback(&mut self, handle: WatchHandle, callback: WatchCallback) {
        if let Ok(watch) = self.slot_mut(handle) {
            watch.callback = Some(callback);
        }
    }
}
