//! Signal source: delivers blocked signals through `signalfd(2)` instead of a
//! traditional handler.
//!
//! Ground truth: `io_src_sig.c` (`examples/original_source/libioutils/src/`).
//! The lifecycle is unchanged from the C original — block the requested
//! signals with `sigprocmask`, open a `signalfd` over the same mask, and on
//! cleanup restore whatever mask was in effect before construction — only the
//! callback shape and error plumbing are idiomatic-Rust (a generic `FnMut`
//! instead of a raw function pointer, `io::Result` instead of negative
//! errno). The `signalfd`-over-`mio::unix::SourceFd` split in
//! `other_examples`' `Thomasdezeeuw-mio-signals` confirms the read-siginfo,
//! translate-`WouldBlock`-to-`Ok(None)` shape reused in `on_ready` below.

use std::io;
use std::mem::{size_of, MaybeUninit};
use std::os::fd::{FromRawFd, OwnedFd};

use crate::interest::Interest;
use crate::source::{Disposition, Source, SourceRecord};

/// A signal source. `F` is invoked with the raw `signalfd_siginfo` for each
/// delivered signal and returns the [`Disposition`] to apply afterwards.
pub struct SignalSource<F> {
    record: SourceRecord,
    old_mask: libc::sigset_t,
    callback: F,
}

impl<F> SignalSource<F>
where
    F: FnMut(&libc::signalfd_siginfo) -> io::Result<Disposition>,
{
    /// Blocks `signals` for the calling thread and opens a `signalfd` that
    /// receives them. `signals` must be non-empty — mirrors
    /// `io_src_sig_init`'s "first signal MUST be retrieved" check, which
    /// rejects a call with no signal numbers at all.
    pub fn new(signals: &[libc::c_int], callback: F) -> io::Result<SignalSource<F>> {
        if signals.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "signal source needs at least one signal",
            ));
        }

        let mut mask: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut mask);
        }
        for &signo in signals {
            if unsafe { libc::sigaddset(&mut mask, signo) } == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        let mut old_mask: libc::sigset_t = unsafe { std::mem::zeroed() };
        if unsafe { libc::sigprocmask(libc::SIG_BLOCK, &mask, &mut old_mask) } == -1 {
            return Err(io::Error::last_os_error());
        }

        let raw_fd = unsafe { libc::signalfd(-1, &mask, libc::SFD_NONBLOCK | libc::SFD_CLOEXEC) };
        if raw_fd == -1 {
            let err = io::Error::last_os_error();
            // Restore the mask we just changed before bailing out.
            unsafe { libc::sigprocmask(libc::SIG_SETMASK, &old_mask, std::ptr::null_mut()) };
            return Err(err);
        }
        // SAFETY: `signalfd` just handed us a freshly-opened, uniquely-owned fd.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        let record = match SourceRecord::new(fd, Interest::READABLE) {
            Ok(r) => r,
            Err(e) => {
                unsafe { libc::sigprocmask(libc::SIG_SETMASK, &old_mask, std::ptr::null_mut()) };
                return Err(e);
            }
        };

        Ok(SignalSource {
            record,
            old_mask,
            callback,
        })
    }
}

impl<F> Source for SignalSource<F>
where
    F: FnMut(&libc::signalfd_siginfo) -> io::Result<Disposition>,
{
    fn record(&self) -> &SourceRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut SourceRecord {
        &mut self.record
    }

    fn on_ready(&mut self) -> io::Result<Disposition> {
        if self.record.last_events().is_error() {
            return Err(io::Error::new(io::ErrorKind::Other, "signalfd reported an error"));
        }

        let mut info: MaybeUninit<libc::signalfd_siginfo> = MaybeUninit::uninit();
        let n = syscall!(read(
            self.record.fd(),
            info.as_mut_ptr() as *mut libc::c_void,
            size_of::<libc::signalfd_siginfo>(),
        ))?;
        if n as usize != size_of::<libc::signalfd_siginfo>() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from signalfd",
            ));
        }
        // SAFETY: `read` filled exactly `size_of::<signalfd_siginfo>()` bytes.
        let info = unsafe { info.assume_init() };
        (self.callback)(&info)
    }

    fn on_clean(&mut self) {
        // Gently restore the mask the caller had before this source blocked
        // these signals, same as `sig_clean` in the original.
        unsafe {
            libc::sigprocmask(libc::SIG_SETMASK, &self.old_mask, std::ptr::null_mut());
        }
    }
}
