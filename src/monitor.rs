//! The event monitor: an epoll-backed, single-threaded readiness dispatcher
//! over a registry of heterogeneous [`Source`]s.
//!
//! Ground truth: `mio`'s `Poll`/`Registry` (`src/poll.rs`) for the overall
//! shape (a selector plus a non-blocking dispatch loop), combined with
//! spec.md §4.3's one-shot, edge-triggered arming discipline, which upstream
//! `Poll` doesn't impose by default.
//!
//! Unlike `mio`, which leaves token-to-handler lookup entirely to the caller,
//! this monitor owns an intrusive registry of its sources (spec.md's
//! `io_monitor` keeps the equivalent list itself) and resolves an epoll
//! token back to a source by a forward scan over that list, keyed by fd. A
//! process's signal/process-exit/message sources rarely number more than a
//! handful, so the scan is deliberately simple rather than back-ended by a
//! hash map — see `DESIGN.md`.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr::NonNull;

use crate::interest::Interest;
use crate::list::List;
use crate::source::{Disposition, Source};
use crate::sys::epoll::{self, Selector};

const DEFAULT_CAPACITY: usize = 64;

/// The monitor. Holds no sources by value — only raw pointers into
/// caller-owned memory, exactly as `io_monitor` does in the original.
pub struct Monitor {
    selector: Selector,
    registry: List<dyn Source>,
    events: Vec<libc::epoll_event>,
    pending_removal: Vec<NonNull<dyn Source>>,
}

impl Monitor {
    pub fn new() -> io::Result<Monitor> {
        Monitor::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how many ready fds a single `process_events` call
    /// can observe; it does not bound how many sources may be registered.
    pub fn with_capacity(capacity: usize) -> io::Result<Monitor> {
        Ok(Monitor {
            selector: Selector::new()?,
            registry: List::new(),
            events: Vec::with_capacity(capacity),
            pending_removal: Vec::new(),
        })
    }

    /// Registers `source` with epoll under its interest mask — edge-triggered
    /// plus one-shot, per spec.md §4.3 — and links it into the registry. The
    /// source is `Armed` immediately; there is no separate arming step, so a
    /// newly `add`-ed source starts receiving readiness events right away.
    ///
    /// # Safety
    /// `source` must stay at a fixed address and must outlive its membership
    /// in this monitor — until it is removed via [`Monitor::remove`]/
    /// [`Monitor::clean`], fires `Disposition::Remove`/an `on_ready` error, or
    /// this `Monitor` is dropped. The monitor never takes ownership, the same
    /// contract `io_src_init`'s caller is bound by in the original.
    pub unsafe fn add<S: Source>(&mut self, source: &mut S) -> io::Result<()> {
        let fd = source.fd();
        let interest = source.interest();
        #[cfg(feature = "log")]
        log::trace!("arming fd {fd} with {interest:?}");
        self.selector.register(fd, fd as u64, interest)?;
        source.record_mut().set_armed(true);

        let ptr: NonNull<dyn Source> = NonNull::from(source as &mut dyn Source);
        self.registry.push(ptr);
        Ok(())
    }

    /// Re-arms a previously-fired `source`, optionally narrowing its interest
    /// first via `source.record_mut()`. `process_events` already does this
    /// for you via the returned [`Disposition`] — `activate` is for manual
    /// re-arming outside the normal dispatch path. Fails if `source` is not
    /// currently registered with this monitor (spec.md §4.3).
    pub fn activate<S: Source>(&mut self, source: &mut S) -> io::Result<()> {
        let ptr: NonNull<dyn Source> = NonNull::from(source as &mut dyn Source);
        let registered = self
            .registry
            .head()
            .is_some_and(|head| List::find_by_address(head, ptr).is_some());
        if !registered {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "source is not registered with this monitor",
            ));
        }

        let fd = source.fd();
        let interest = source.interest();
        self.selector.reregister(fd, fd as u64, interest)?;
        source.record_mut().set_armed(true);
        Ok(())
    }

    /// Runs one non-blocking dispatch round: polls epoll, and for every
    /// source whose observed readiness intersects its interest, invokes
    /// `on_ready` and re-arms or removes it per the returned [`Disposition`].
    /// Never blocks — a zero-timeout `epoll_wait` underneath, per spec.md
    /// §4.3. Returns the number of sources whose callback ran.
    pub fn process_events(&mut self) -> io::Result<usize> {
        let mut events = std::mem::take(&mut self.events);
        let poll_result = self.selector.poll(&mut events);
        let n = match poll_result {
            Ok(n) => n,
            Err(e) => {
                self.events = events;
                return Err(e);
            }
        };

        let mut fired = 0;
        for ev in events.iter().take(n) {
            let fd = epoll::event_token(ev) as RawFd;
            let readiness = epoll::event_readiness(ev);

            let head = match self.registry.head() {
                Some(h) => h,
                None => continue,
            };
            let mut node = match List::find_by_predicate(head, &|s: &dyn Source| s.fd() == fd) {
                Some(n) => n,
                None => continue,
            };

            // SAFETY: `node` was found in the registry, which only holds
            // pointers the caller promised (via `add`'s contract) to keep
            // valid for as long as they remain registered.
            let src = unsafe { node.as_mut() };
            src.record_mut().set_armed(false);
            src.record_mut().set_last_events(readiness);
            if !readiness.intersects_interest(src.interest()) {
                continue;
            }
            fired += 1;

            match src.on_ready() {
                Ok(Disposition::Rearm) => self.rearm_or_drop(node, fd, src.interest()),
                Ok(Disposition::RearmWith(interest)) => {
                    src.record_mut().set_interest(interest);
                    self.rearm_or_drop(node, fd, interest);
                }
                Ok(Disposition::Remove) => self.pending_removal.push(node),
                Err(_e) => {
                    #[cfg(feature = "log")]
                    log::error!("source on fd {fd} failed on_ready: {_e}");
                    self.pending_removal.push(node);
                }
            }
        }

        self.events = events;
        self.drain_pending_removal();
        Ok(fired)
    }

    fn rearm_or_drop(&mut self, mut node: NonNull<dyn Source>, fd: RawFd, interest: Interest) {
        match self.selector.reregister(fd, fd as u64, interest) {
            Ok(()) => unsafe { node.as_mut() }.record_mut().set_armed(true),
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("failed to re-arm fd {fd}: {_e}");
                self.pending_removal.push(node);
            }
        }
    }

    /// Dequeues `source` from epoll and the registry. Does **not** invoke
    /// `on_clean` — cleanup is the caller's responsibility, performed via
    /// [`Monitor::clean`] (spec.md §4.3). A no-op if `source` is not
    /// currently registered. Leaves `source` safe for immediate re-`add`,
    /// per spec.md §8's registration round-trip property.
    pub fn remove<S: Source>(&mut self, source: &mut S) -> io::Result<()> {
        let ptr: NonNull<dyn Source> = NonNull::from(source as &mut dyn Source);
        let head = match self.registry.head() {
            Some(h) => h,
            None => return Ok(()),
        };
        if List::find_by_address(head, ptr).is_none() {
            return Ok(());
        }
        self.detach_only(ptr)
    }

    /// `remove` followed by `on_clean` — the combined teardown operation
    /// (spec.md §4.3). A no-op if `source` is not currently registered (in
    /// particular, `on_clean` is not invoked in that case).
    pub fn clean<S: Source>(&mut self, source: &mut S) -> io::Result<()> {
        let ptr: NonNull<dyn Source> = NonNull::from(source as &mut dyn Source);
        let head = match self.registry.head() {
            Some(h) => h,
            None => return Ok(()),
        };
        if List::find_by_address(head, ptr).is_none() {
            return Ok(());
        }
        self.clean_node(ptr)
    }

    fn drain_pending_removal(&mut self) {
        let pending = std::mem::take(&mut self.pending_removal);
        for node in pending {
            if let Err(_e) = self.clean_node(node) {
                #[cfg(feature = "log")]
                log::error!("failed to deregister a removed source: {_e}");
            }
        }
    }

    /// Unlinks `node` from the registry and deregisters its fd from epoll.
    /// Does not run `on_clean` — see [`Monitor::remove`].
    fn detach_only(&mut self, mut node: NonNull<dyn Source>) -> io::Result<()> {
        let fd = unsafe { node.as_ref() }.fd();
        #[cfg(feature = "log")]
        log::trace!("deregistering fd {fd}");
        self.registry.remove(node);
        unsafe { node.as_mut() }.record_mut().set_armed(false);
        self.selector.deregister(fd)
    }

    /// `detach_only` plus `on_clean` — used for every automatic teardown path
    /// (a `Disposition::Remove`/error from `on_ready`, or a failed re-arm),
    /// where running cleanup is always correct since the source is leaving
    /// the monitor for good.
    fn clean_node(&mut self, mut node: NonNull<dyn Source>) -> io::Result<()> {
        let result = self.detach_only(node);
        unsafe { node.as_mut() }.on_clean();
        result
    }
}

impl AsRawFd for Monitor {
    /// Exposes the underlying epoll fd, for callers that want to fold this
    /// monitor into their own raw `poll`/`epoll_wait` loop instead of calling
    /// [`Monitor::process_events`]. The two interest models are mutually
    /// exclusive: drive readiness through one or the other, not both.
    fn as_raw_fd(&self) -> RawFd {
        self.selector.as_raw_fd()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        while let Some(mut node) = self.registry.pop() {
            unsafe { node.as_mut() }.on_clean();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::{Interest, Readiness};
    use crate::source::SourceRecord;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixDatagram;

    struct Probe {
        record: SourceRecord,
        ready_calls: usize,
        clean_calls: usize,
        disposition: Disposition,
    }

    impl Probe {
        fn new(fd: OwnedFd, disposition: Disposition) -> Probe {
            Probe {
                record: SourceRecord::new(fd, Interest::READABLE).unwrap(),
                ready_calls: 0,
                clean_calls: 0,
                disposition,
            }
        }
    }

    impl Source for Probe {
        fn record(&self) -> &SourceRecord {
            &self.record
        }
        fn record_mut(&mut self) -> &mut SourceRecord {
            &mut self.record
        }
        fn on_ready(&mut self) -> io::Result<Disposition> {
            self.ready_calls += 1;
            Ok(self.disposition)
        }
        fn on_clean(&mut self) {
            self.clean_calls += 1;
        }
    }

    fn fd_pair() -> (OwnedFd, UnixDatagram) {
        let (a, b) = UnixDatagram::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        (OwnedFd::from(a), b)
    }

    #[test]
    fn dispatches_readable_source_and_rearms() {
        let mut monitor = Monitor::new().unwrap();
        let (fd, peer) = fd_pair();
        let mut probe = Probe::new(fd, Disposition::Rearm);

        unsafe { monitor.add(&mut probe).unwrap() };

        peer.send(b"x").unwrap();
        let fired = monitor.process_events().unwrap();
        assert_eq!(fired, 1);
        assert_eq!(probe.ready_calls, 1);
        assert_eq!(probe.clean_calls, 0);
        assert!(probe.record().is_armed());
    }

    #[test]
    fn remove_does_not_invoke_on_clean() {
        let mut monitor = Monitor::new().unwrap();
        let (fd, _peer) = fd_pair();
        let mut probe = Probe::new(fd, Disposition::Rearm);

        unsafe { monitor.add(&mut probe).unwrap() };
        monitor.remove(&mut probe).unwrap();
        // Already removed: a second call is a no-op, not a double-cleanup.
        monitor.remove(&mut probe).unwrap();

        assert_eq!(probe.clean_calls, 0);
    }

    #[test]
    fn clean_removes_and_invokes_on_clean_once() {
        let mut monitor = Monitor::new().unwrap();
        let (fd, _peer) = fd_pair();
        let mut probe = Probe::new(fd, Disposition::Rearm);

        unsafe { monitor.add(&mut probe).unwrap() };
        monitor.clean(&mut probe).unwrap();
        // No longer registered: a second call must not invoke `on_clean` again.
        monitor.clean(&mut probe).unwrap();

        assert_eq!(probe.clean_calls, 1);
    }

    #[test]
    fn add_then_remove_leaves_source_reusable() {
        let mut monitor = Monitor::new().unwrap();
        let (fd, peer) = fd_pair();
        let mut probe = Probe::new(fd, Disposition::Rearm);

        unsafe { monitor.add(&mut probe).unwrap() };
        monitor.remove(&mut probe).unwrap();
        assert_eq!(probe.clean_calls, 0);

        // Re-adding an unclean, removed source must work exactly as the
        // first `add` did (spec.md §8's registration round-trip property).
        unsafe { monitor.add(&mut probe).unwrap() };
        peer.send(b"x").unwrap();
        let fired = monitor.process_events().unwrap();
        assert_eq!(fired, 1);
        assert_eq!(probe.ready_calls, 1);
    }

    #[test]
    fn activate_fails_when_not_registered() {
        let mut monitor = Monitor::new().unwrap();
        let (fd, _peer) = fd_pair();
        let mut probe = Probe::new(fd, Disposition::Rearm);

        let err = monitor.activate(&mut probe).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn on_ready_remove_disposition_triggers_cleanup() {
        let mut monitor = Monitor::new().unwrap();
        let (fd, peer) = fd_pair();
        let mut probe = Probe::new(fd, Disposition::Remove);

        unsafe { monitor.add(&mut probe).unwrap() };

        peer.send(b"x").unwrap();
        monitor.process_events().unwrap();

        assert_eq!(probe.clean_calls, 1);
    }

    #[test]
    fn process_events_with_empty_registry_returns_zero() {
        let mut monitor = Monitor::new().unwrap();
        assert_eq!(monitor.process_events().unwrap(), 0);
        let _ = Readiness::EMPTY;
    }
}
