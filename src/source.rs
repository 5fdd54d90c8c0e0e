//! The monitor-side contract every concrete source (signal, process-exit,
//! message) implements, plus the shared bookkeeping ([`SourceRecord`]) each of
//! them embeds.
//!
//! Ground truth: spec.md §4.2 describes a concrete source as a C struct that
//! embeds an `io_src` record as its first member, recovered from a generic
//! callback via `container_of`. There's no safe, MSRV-1.71 `container_of` in
//! Rust, so the embedding survives but the recovery doesn't: instead of the
//! monitor reaching back into caller memory by pointer arithmetic, each
//! concrete source implements the [`Source`] trait directly and the monitor
//! drives it through a `dyn Source` reference (REDESIGN FLAG #2 in
//! `SPEC_FULL.md`).

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::interest::{Interest, Readiness};
use crate::list::{Link, Linked};

/// What a source wants the monitor to do after handling one readiness event.
///
/// Every registration is one-shot (spec.md §4.3), so "do nothing" would
/// silently starve the source; `Rearm` is the expected steady-state return.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Re-arm with the same interest the source already had.
    Rearm,
    /// Re-arm, but narrow (or widen) the interest going forward.
    RearmWith(Interest),
    /// Deregister and run `on_clean`; the source is done.
    Remove,
}

/// Fields every concrete source embeds: spec.md §3's `io_src` record, minus
/// the raw-callback pointers (each concrete source's `on_ready`/`on_clean`
/// *are* the trait methods below, not a field to store).
pub struct SourceRecord {
    fd: OwnedFd,
    interest: Interest,
    last_events: Readiness,
    armed: bool,
    link: Link<dyn Source>,
}

impl SourceRecord {
    /// Validates and builds a record. Mirrors the checks `io_src_init` makes
    /// in the original: a non-negative fd (enforced here by taking an
    /// `OwnedFd`, which cannot be negative) and a non-empty interest set.
    pub fn new(fd: OwnedFd, interest: Interest) -> io::Result<SourceRecord> {
        if interest.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "source interest must be non-empty",
            ));
        }
        Ok(SourceRecord {
            fd,
            interest,
            last_events: Readiness::EMPTY,
            armed: false,
            link: Link::new(),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub(crate) fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    pub fn last_events(&self) -> Readiness {
        self.last_events
    }

    pub(crate) fn set_last_events(&mut self, events: Readiness) {
        self.last_events = events;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }

    pub(crate) fn set_armed(&mut self, armed: bool) {
        self.armed = armed;
    }
}

/// Implemented by every concrete source type the monitor can register.
///
/// A type implementing `Source` owns its [`SourceRecord`] (by value, as a
/// field) plus whatever state its readiness callback needs; the monitor never
/// allocates or owns sources itself, only pointers into caller-owned memory,
/// so — exactly as in the C original — the caller must keep a registered
/// source's address stable until it is removed.
pub trait Source {
    /// Access to the embedded bookkeeping record.
    fn record(&self) -> &SourceRecord;
    fn record_mut(&mut self) -> &mut SourceRecord;

    /// Invoked by the monitor when `last_events` intersects interest (or
    /// carries an error/hangup bit). Spec.md §4.3: "Errors returned by
    /// `on_ready` ... cause the source to be removed and `on_clean` to run",
    /// so a source returns `Err` the same way it would return `Disposition`.
    fn on_ready(&mut self) -> io::Result<Disposition>;

    /// Invoked once, when the source leaves the monitor's registry, whether
    /// by explicit removal, an `on_ready` error, or monitor teardown.
    fn on_clean(&mut self);

    fn fd(&self) -> RawFd {
        self.record().fd()
    }

    fn interest(&self) -> Interest {
        self.record().interest()
    }

    fn last_events(&self) -> Readiness {
        self.record().last_events()
    }
}

// SAFETY: every `Source` stores its `Link` inside its own `SourceRecord`, at
// a fixed field, for the value's whole lifetime (the field is private and
// never swapped out).
unsafe impl Linked for dyn Source {
    fn link(&self) -> &Link<Self> {
        &self.record().link
    }

    fn link_mut(&mut self) -> &mut Link<Self> {
        &mut self.record_mut().link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    fn dummy_fd() -> OwnedFd {
        // stdin is always open in a test process; we never read/write it.
        unsafe { OwnedFd::from_raw_fd(libc::dup(0)) }
    }

    #[test]
    fn new_accepts_a_combined_interest_set() {
        let fd = dummy_fd();
        let rec = SourceRecord::new(fd, Interest::READABLE | Interest::WRITABLE);
        assert!(rec.is_ok());
    }

    #[test]
    fn new_tracks_interest_and_starts_unarmed() {
        let fd = dummy_fd();
        let rec = SourceRecord::new(fd, Interest::READABLE).unwrap();
        assert!(rec.interest().is_readable());
        assert!(!rec.is_armed());
        assert_eq!(rec.last_events(), Readiness::EMPTY);
    }
}
