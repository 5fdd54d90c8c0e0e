//! Raw fd source: a thin adapter for registering an arbitrary descriptor the
//! monitor has no dedicated source type for.
//!
//! Ground truth: `mio::unix::SourceFd`, the wrapper the
//! `Thomasdezeeuw-mio-signals` example builds its own signalfd source on top
//! of before this crate grew a dedicated [`crate::signal::SignalSource`].
//! `SourceFd` only borrows the fd (the caller keeps closing it); this
//! adapter owns it instead, matching every other source in this crate.

use std::io;
use std::os::fd::OwnedFd;

use crate::interest::{Interest, Readiness};
use crate::source::{Disposition, Source, SourceRecord};

/// Wraps an arbitrary fd with a user-supplied readiness callback. Useful for
/// one-off descriptors (a timerfd, an eventfd, a plain pipe used without
/// message framing) that don't warrant their own [`Source`] impl.
pub struct RawFdSource<F> {
    record: SourceRecord,
    callback: F,
}

impl<F> RawFdSource<F>
where
    F: FnMut(Readiness) -> io::Result<Disposition>,
{
    pub fn new(fd: OwnedFd, interest: Interest, callback: F) -> io::Result<RawFdSource<F>> {
        let record = SourceRecord::new(fd, interest)?;
        Ok(RawFdSource { record, callback })
    }
}

impl<F> Source for RawFdSource<F>
where
    F: FnMut(Readiness) -> io::Result<Disposition>,
{
    fn record(&self) -> &SourceRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut SourceRecord {
        &mut self.record
    }

    fn on_ready(&mut self) -> io::Result<Disposition> {
        (self.callback)(self.record.last_events())
    }

    fn on_clean(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;
    use std::os::unix::net::UnixDatagram;

    #[test]
    fn forwards_observed_readiness_to_the_callback() {
        let (a, b) = UnixDatagram::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let fd = unsafe { OwnedFd::from_raw_fd(std::os::fd::IntoRawFd::into_raw_fd(a)) };

        let mut seen = Readiness::EMPTY;
        let mut source = RawFdSource::new(fd, Interest::READABLE, |r| {
            seen = r;
            Ok(Disposition::Remove)
        })
        .unwrap();

        source.record_mut().set_last_events(Readiness::READABLE);
        let disposition = source.on_ready().unwrap();

        assert_eq!(disposition, Disposition::Remove);
        assert!(seen.is_readable());
        drop(b);
    }
}
