//! Process-exit source: notifies when a specific pid terminates, using the
//! kernel's process-events connector instead of polling or a `SIGCHLD`
//! handler.
//!
//! Ground truth: `pidwatch` (`examples/original_source/pidwatch/`), whose
//! test suite (`tests/pw_tests.c`) is the source of the validation rules in
//! [`ProcessExitSource::new`]: a non-positive pid or one at/above
//! `/proc/sys/kernel/pid_max` is rejected with `EINVAL`, and a pid that is
//! already a zombie (or simply doesn't exist) by the time we look it up is
//! rejected with `ESRCH`, matching `pidwatch_create`'s "if the child dies
//! before we set up the watch ... ESRCH is raised".

use std::io;

use crate::interest::Interest;
use crate::source::{Disposition, Source, SourceRecord};
use crate::sys::netlink;

/// A process's reported exit status, decoded from `waitpid`'s raw status
/// word.
#[derive(Debug, Copy, Clone)]
pub struct ExitStatus(libc::c_int);

impl ExitStatus {
    /// The exit code, if the process terminated normally.
    pub fn code(&self) -> Option<i32> {
        if libc::WIFEXITED(self.0) {
            Some(libc::WEXITSTATUS(self.0))
        } else {
            None
        }
    }

    /// The terminating signal, if the process was killed by one.
    pub fn signal(&self) -> Option<i32> {
        if libc::WIFSIGNALED(self.0) {
            Some(libc::WTERMSIG(self.0))
        } else {
            None
        }
    }

    pub fn into_raw(self) -> libc::c_int {
        self.0
    }
}

/// Blocking convenience wrapper around `waitpid`, for callers that don't need
/// a [`Monitor`](crate::monitor::Monitor) round trip and are happy to block
/// until `pid` exits.
pub fn wait(pid: libc::pid_t) -> io::Result<ExitStatus> {
    netlink::wait_status(pid).map(ExitStatus)
}

fn read_pid_max() -> io::Result<libc::pid_t> {
    let raw = std::fs::read_to_string("/proc/sys/kernel/pid_max")?;
    raw.trim()
        .parse::<libc::pid_t>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unparsable pid_max"))
}

/// A process-exit source. `F` is invoked exactly once, the first (and only)
/// time this pid's exit is observed — at-most-once delivery, per spec.md §8.
pub struct ProcessExitSource<F> {
    record: SourceRecord,
    pid: libc::pid_t,
    fired: bool,
    callback: F,
}

impl<F> ProcessExitSource<F>
where
    F: FnMut(ExitStatus) -> io::Result<Disposition>,
{
    pub fn new(pid: libc::pid_t, callback: F) -> io::Result<ProcessExitSource<F>> {
        if pid <= 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let pid_max = read_pid_max()?;
        if pid >= pid_max {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        // Subscribe to the multicast group *before* checking liveness: the
        // channel delivers nothing retroactively, so checking liveness first
        // would leave a window where `pid` could exit between the check and
        // the subscribe, and its exit notice would never arrive. Open first,
        // then verify, closing the socket on `ESRCH` (pw_tests.c's ordering).
        let fd = netlink::open(true)?;
        if !netlink::is_alive(pid)? {
            return Err(io::Error::from_raw_os_error(libc::ESRCH));
        }

        let record = SourceRecord::new(fd, Interest::READABLE)?;
        Ok(ProcessExitSource {
            record,
            pid,
            fired: false,
            callback,
        })
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }
}

impl<F> Source for ProcessExitSource<F>
where
    F: FnMut(ExitStatus) -> io::Result<Disposition>,
{
    fn record(&self) -> &SourceRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut SourceRecord {
        &mut self.record
    }

    fn on_ready(&mut self) -> io::Result<Disposition> {
        if self.fired {
            return Ok(Disposition::Remove);
        }

        let mut buf = [0u8; 512];
        loop {
            match netlink::recv_one(self.record.fd(), &mut buf) {
                Ok(Some(notice)) if notice.pid == self.pid => {
                    let status = netlink::wait_status(self.pid)?;
                    self.fired = true;
                    return (self.callback)(ExitStatus(status));
                }
                // Multicast channel: events for other pids, or malformed /
                // uninteresting messages. Keep draining this round.
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Disposition::Rearm),
                Err(e) => return Err(e),
            }
        }
    }

    fn on_clean(&mut self) {}
}
