//! Framed-message source: delivers fixed-size values read whole off a file
//! descriptor (a pipe, in the usual case), one value per ready-read.
//!
//! Ground truth: `io_src_msg.c`/`io_src_msg_test.c`
//! (`examples/original_source/libioutils/`). The C source stores the message
//! buffer and its length inline in `struct io_src_msg` and hands both to the
//! callback; here the buffer is simply `T` itself (the source is generic
//! over the message type) and the callback receives `&T` plus the number of
//! bytes actually read, which only differs from `size_of::<T>()` when the
//! peer writes short (treated as a framing error, see `on_ready`).

use std::io;
use std::marker::PhantomData;
use std::mem::{size_of, MaybeUninit};
use std::os::fd::OwnedFd;

use crate::interest::Interest;
use crate::source::{Disposition, Source, SourceRecord};

/// A message source for fixed-size `T` values. `F` is invoked with each
/// value read and the byte count, and returns the [`Disposition`] to apply.
pub struct MessageSource<T, F> {
    record: SourceRecord,
    callback: F,
    _marker: PhantomData<T>,
}

impl<T, F> MessageSource<T, F>
where
    T: Copy,
    F: FnMut(&T, usize) -> io::Result<Disposition>,
{
    /// `fd` is typically the read end of a pipe or socket the caller already
    /// holds; ownership moves in, matching every other source in this crate.
    pub fn new(fd: OwnedFd, callback: F) -> io::Result<MessageSource<T, F>> {
        let record = SourceRecord::new(fd, Interest::READABLE)?;
        Ok(MessageSource {
            record,
            callback,
            _marker: PhantomData,
        })
    }
}

impl<T, F> Source for MessageSource<T, F>
where
    T: Copy,
    F: FnMut(&T, usize) -> io::Result<Disposition>,
{
    fn record(&self) -> &SourceRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut SourceRecord {
        &mut self.record
    }

    fn on_ready(&mut self) -> io::Result<Disposition> {
        let mut buf: MaybeUninit<T> = MaybeUninit::uninit();
        let n = syscall!(read(
            self.record.fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            size_of::<T>(),
        ))?;
        let n = n as usize;

        if n == 0 {
            // Peer closed its end: nothing more will ever arrive.
            return Ok(Disposition::Remove);
        }
        if n != size_of::<T>() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read: message framing violated",
            ));
        }

        // SAFETY: `read` filled exactly `size_of::<T>()` bytes.
        let msg = unsafe { buf.assume_init_ref() };
        (self.callback)(msg, n)
    }

    fn on_clean(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;
    use std::os::unix::io::AsRawFd;

    #[derive(Copy, Clone, Debug, PartialEq)]
    #[repr(C)]
    struct Msg {
        a: u8,
        b: i32,
        c: f64,
    }

    fn pipe_pair() -> (OwnedFd, OwnedFd) {
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe {
            (
                OwnedFd::from_raw_fd(fds[0]),
                OwnedFd::from_raw_fd(fds[1]),
            )
        }
    }

    #[test]
    fn receives_four_chained_messages() {
        let (read_fd, write_fd) = pipe_pair();
        unsafe {
            libc::fcntl(read_fd.as_raw_fd(), libc::F_SETFL, libc::O_NONBLOCK);
        }

        const MSG1: Msg = Msg { a: 11, b: 11111, c: 11.111 };
        const MSG2: Msg = Msg { a: 22, b: 22222, c: 22.222 };
        const MSG3: Msg = Msg { a: 33, b: 33333, c: 33.333 };
        const MSG4: Msg = Msg { a: 44, b: 44444, c: 44.444 };

        let write_fd_raw = write_fd.as_raw_fd();
        let write_msg = |msg: &Msg| -> io::Result<()> {
            let bytes = unsafe {
                std::slice::from_raw_parts(msg as *const Msg as *const u8, size_of::<Msg>())
            };
            syscall!(write(
                write_fd_raw,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
            ))
            .map(|_| ())
        };

        let mut received = Vec::new();
        let mut source = MessageSource::<Msg, _>::new(read_fd, move |msg: &Msg, _len| {
            received.push(*msg);
            let next = match *msg {
                MSG1 => Some(MSG2),
                MSG2 => Some(MSG3),
                MSG3 => Some(MSG4),
                _ => None,
            };
            if let Some(next) = next {
                write_msg(&next)?;
            }
            if *msg == MSG4 {
                Ok(Disposition::Remove)
            } else {
                Ok(Disposition::Rearm)
            }
        })
        .unwrap();

        write_msg(&MSG1).unwrap();

        loop {
            match source.on_ready().unwrap() {
                Disposition::Remove => break,
                _ => continue,
            }
        }

        assert_eq!(received, vec![MSG1, MSG2, MSG3, MSG4]);
    }
}
