//! Thin wrapper around `epoll`, the monitor's readiness-polling object.
//!
//! Ground truth: `src/sys/unix/selector/epoll.rs` in the teacher crate. Unlike
//! that file, registration here always requests edge-triggered *and*
//! one-shot delivery (`EPOLLET | EPOLLONESHOT`), per spec.md §4.3: each
//! readiness event must be explicitly re-armed by the caller.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT};

use crate::interest::{Interest, Readiness};

/// A registered fd's raw epoll token. epoll lets us stash an arbitrary `u64`
/// per registration; the monitor uses the fd itself as the token and
/// resolves it back to a source with a registry scan (see `monitor.rs`), so
/// `token` here is just a transparent `u64` the monitor interprets.
pub type Token = u64;

#[derive(Debug)]
pub struct Selector {
    ep: OwnedFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        // SAFETY: `epoll_create1(2)` returns a valid fd or -1.
        let ep = unsafe { OwnedFd::from_raw_fd(syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?) };
        Ok(Selector { ep })
    }

    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: token,
        };
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_ADD,
            fd,
            &mut event
        ))
        .map(|_| ())
    }

    /// Re-arms a one-shot source, optionally narrowing its interest.
    pub fn reregister(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: token,
        };
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_MOD,
            fd,
            &mut event
        ))
        .map(|_| ())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut()
        ))
        .map(|_| ())
    }

    /// Non-blocking poll: a zero timeout, matching spec.md §4.3's
    /// "`process_events` itself never blocks".
    pub fn poll(&self, events: &mut Vec<libc::epoll_event>) -> io::Result<usize> {
        events.clear();
        let n = syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            events.as_mut_ptr(),
            events.capacity() as i32,
            0,
        ))?;
        // SAFETY: `epoll_wait` initialised exactly `n` elements.
        unsafe { events.set_len(n as usize) };
        Ok(n as usize)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn poll_timeout(
        &self,
        events: &mut Vec<libc::epoll_event>,
        timeout: Duration,
    ) -> io::Result<usize> {
        events.clear();
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        let n = syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            events.as_mut_ptr(),
            events.capacity() as i32,
            millis,
        ))?;
        unsafe { events.set_len(n as usize) };
        Ok(n as usize)
    }
}

impl AsRawFd for Selector {
    fn as_raw_fd(&self) -> RawFd {
        self.ep.as_raw_fd()
    }
}

fn interest_to_epoll(interest: Interest) -> u32 {
    let mut bits = EPOLLET | EPOLLONESHOT;
    if interest.is_readable() {
        bits |= EPOLLIN;
    }
    if interest.is_writable() {
        bits |= EPOLLOUT;
    }
    bits as u32
}

pub fn event_token(event: &libc::epoll_event) -> Token {
    event.u64
}

pub fn event_readiness(event: &libc::epoll_event) -> Readiness {
    let bits = event.events as i32;
    let mut r = Readiness::EMPTY;
    if bits & EPOLLIN != 0 {
        r |= Readiness::READABLE;
    }
    if bits & EPOLLOUT != 0 {
        r |= Readiness::WRITABLE;
    }
    if bits & EPOLLHUP != 0 {
        r |= Readiness::HUP;
    }
    if bits & EPOLLERR != 0 {
        r |= Readiness::ERROR;
    }
    r
}
