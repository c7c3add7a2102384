//! Self-pipe signal delivery.
//!
//! A process-wide signal handler cannot call back into the loop, so the
//! trampoline installed here only writes the signal number to a non-blocking
//! pipe. The poll backend keeps the pipe's read end in its poll set and turns
//! drained bytes into watch firings on the next tick.

use crate::error::LoopError;

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

/// Write end of the signal pipe, shared with the trampoline.
///
/// Signal handlers are process-global, so only one pipe can exist per
/// process; the first manager that enables signals installs it.
static SIGNAL_PIPE_WRITER: AtomicI32 = AtomicI32::new(-1);

/// Async-signal-safe handler: forward the signal number into the pipe.
extern "C" fn trampoline(signo: libc::c_int) {
    let fd = SIGNAL_PIPE_WRITER.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = signo as u8;
        // A full pipe just drops the notification; the watch stays armed.
        unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) };
    }
}

/// The pipe the poll set watches for delivered signals.
pub(crate) struct SignalPipe {
    pub(crate) read_end: RawFd,
    write_end: RawFd,
}

impl SignalPipe {
    /// Creates the non-blocking pipe and publishes its write end to the
    /// trampoline.
    pub(crate) fn new() -> Result<Self, LoopError> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        if rc != 0 {
            return Err(LoopError::from_errno("pipe2", errno()));
        }

        SIGNAL_PIPE_WRITER.store(fds[1], Ordering::SeqCst);
        log::debug!("signal pipe installed (read fd {})", fds[0]);

        Ok(Self {
            read_end: fds[0],
            write_end: fds[1],
        })
    }

    /// Installs the trampoline for one signal.
    pub(crate) fn install(&self, signo: i32) -> Result<(), LoopError> {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = trampoline as usize;
        action.sa_flags = libc::SA_RESTART;
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        let rc = unsafe { libc::sigaction(signo, &action, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(LoopError::from_errno("sigaction", errno()));
        }

        log::debug!("signal handler installed for signal {signo}");
        Ok(())
    }

    /// Restores the default disposition for one signal.
    pub(crate) fn uninstall(&self, signo: i32) {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = libc::SIG_DFL;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signo, &action, std::ptr::null_mut());
        }
    }

    /// Drains every queued signal number out of the pipe.
    pub(crate) fn drain(&self) -> Vec<i32> {
        let mut delivered = Vec::new();
        let mut buffer = [0u8; 64];

        loop {
            let read = unsafe {
                libc::read(
                    self.read_end,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };
            if read <= 0 {
                break;
            }
            delivered.extend(buffer[..read as usize].iter().map(|&b| b as i32));
        }

        delivered
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        SIGNAL_PIPE_WRITER
            .compare_exchange(self.write_end, -1, Ordering::SeqCst, Ordering::SeqCst)
            .ok();
        unsafe {
            libc::close(self.read_end);
            libc::close(self.write_end);
        }
    }
}

/// Last syscall error for this thread.
pub(crate) fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}
