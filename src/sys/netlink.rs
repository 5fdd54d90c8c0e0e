//! Process-events connector: the netlink multicast channel the kernel uses
//! to broadcast `fork`/`exec`/`exit`/... notifications (`linux/cn_proc.h`).
//!
//! `libc` does not expose the connector protocol structures or the
//! `CN_IDX_PROC`/`PROC_EVENT_*` constants (they're not part of any libc ABI,
//! just kernel-header-defined wire types), so they're declared here as
//! `#[repr(C)]` structs laid out to match the kernel headers byte-for-byte.
//! Grounded on `pidwatch/tests/pw_tests.c` (`examples/original_source/`) for
//! the socket-family/flags shape (`socket(PF_NETLINK, SOCK_DGRAM | flags,
//! NETLINK_CONNECTOR)`), and on the hand-rolled-kernel-struct style of
//! `Thaumy-perf-event-open`'s `src/ffi/bindings.rs` for structs libc omits.

use std::fs;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// `linux/connector.h`: `NETLINK_CONNECTOR`.
const NETLINK_CONNECTOR: libc::c_int = 11;
/// `linux/cn_proc.h`: `CN_IDX_PROC` / `CN_VAL_PROC`.
const CN_IDX_PROC: u32 = 0x1;
const CN_VAL_PROC: u32 = 0x1;
/// `linux/cn_proc.h`: control message requesting (1) or cancelling (0)
/// multicast delivery of process events.
const PROC_CN_MCAST_LISTEN: u32 = 1;
/// `linux/cn_proc.h`: `proc_event.what` value for a process exit.
const PROC_EVENT_EXIT: u32 = 0x8000_0000;

#[repr(C)]
#[derive(Copy, Clone)]
struct CbId {
    idx: u32,
    val: u32,
}

#[repr(C)]
#[derive(Copy, Clone)]
struct CnMsg {
    id: CbId,
    seq: u32,
    ack: u32,
    len: u16,
    flags: u16,
}

#[repr(C)]
#[derive(Copy, Clone)]
struct ExitProcEvent {
    process_pid: u32,
    process_tgid: u32,
    exit_code: u32,
    exit_signal: u32,
}

#[repr(C)]
#[derive(Copy, Clone)]
struct ProcEventHeader {
    what: u32,
    cpu: u32,
    timestamp_ns: u64,
}

/// A decoded `PROC_EVENT_EXIT` notification.
#[derive(Debug, Copy, Clone)]
pub struct ExitNotice {
    pub pid: libc::pid_t,
}

/// Opens and binds the process-events multicast socket. Requires
/// `CAP_NET_ADMIN`, per spec.md §4.5 ("elevated privilege is required and is
/// the caller's responsibility").
pub fn open(nonblocking: bool) -> io::Result<OwnedFd> {
    let mut kind = libc::SOCK_DGRAM | libc::SOCK_CLOEXEC;
    if nonblocking {
        kind |= libc::SOCK_NONBLOCK;
    }
    let fd = syscall!(socket(libc::PF_NETLINK, kind, NETLINK_CONNECTOR))?;
    // SAFETY: `socket(2)` just handed us a freshly-opened, uniquely-owned fd.
    let socket = unsafe { OwnedFd::from_raw_fd(fd) };

    let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as u16;
    addr.nl_pid = 0; // let the kernel assign our port id
    addr.nl_groups = CN_IDX_PROC;

    let addr_ptr = &addr as *const libc::sockaddr_nl as *const libc::sockaddr;
    syscall!(bind(
        socket.as_raw_fd(),
        addr_ptr,
        size_of::<libc::sockaddr_nl>() as u32
    ))?;

    subscribe(socket.as_raw_fd())?;
    Ok(socket)
}

/// Sends the `PROC_CN_MCAST_LISTEN` control message that asks the kernel to
/// start delivering process events to us.
fn subscribe(fd: RawFd) -> io::Result<()> {
    #[repr(C)]
    struct Request {
        nlh: libc::nlmsghdr,
        cn: CnMsg,
        op: u32,
    }

    let payload_len = size_of::<CnMsg>() + size_of::<u32>();
    let total_len = size_of::<libc::nlmsghdr>() + payload_len;

    let mut req = Request {
        nlh: unsafe { std::mem::zeroed() },
        cn: CnMsg {
            id: CbId {
                idx: CN_IDX_PROC,
                val: CN_VAL_PROC,
            },
            seq: 0,
            ack: 0,
            len: size_of::<u32>() as u16,
            flags: 0,
        },
        op: PROC_CN_MCAST_LISTEN,
    };
    req.nlh.nlmsg_len = total_len as u32;
    req.nlh.nlmsg_type = libc::NLMSG_DONE as u16;
    req.nlh.nlmsg_flags = 0;
    req.nlh.nlmsg_seq = 0;
    req.nlh.nlmsg_pid = unsafe { libc::getpid() } as u32;

    let buf = &req as *const Request as *const u8;
    let slice = unsafe { std::slice::from_raw_parts(buf, total_len) };
    syscall!(send(
        fd,
        slice.as_ptr() as *const libc::c_void,
        slice.len(),
        0
    ))?;
    Ok(())
}

/// Reads and decodes one datagram, returning `None` for well-formed messages
/// that aren't an exit notification (caller keeps draining until
/// `WouldBlock`, per edge-triggered semantics).
pub fn recv_one(fd: RawFd, buf: &mut [u8]) -> io::Result<Option<ExitNotice>> {
    let n = syscall!(recv(
        fd,
        buf.as_mut_ptr() as *mut libc::c_void,
        buf.len(),
        0
    ))?;
    let n = n as usize;

    let nlh_size = size_of::<libc::nlmsghdr>();
    let cn_size = size_of::<CnMsg>();
    let hdr_size = size_of::<ProcEventHeader>();
    if n < nlh_size + cn_size + hdr_size {
        return Ok(None);
    }

    // SAFETY: size checked above; all three types are `repr(C)` with no
    // padding-sensitive fields and the buffer is at least as large as their
    // concatenation.
    let cn = unsafe { &*(buf.as_ptr().add(nlh_size) as *const CnMsg) };
    if cn.id.idx != CN_IDX_PROC || cn.id.val != CN_VAL_PROC {
        return Ok(None);
    }

    let ev_offset = nlh_size + cn_size;
    let ev_hdr = unsafe { &*(buf.as_ptr().add(ev_offset) as *const ProcEventHeader) };
    if ev_hdr.what != PROC_EVENT_EXIT {
        return Ok(None);
    }

    let exit_offset = ev_offset + hdr_size;
    if n < exit_offset + size_of::<ExitProcEvent>() {
        return Ok(None);
    }
    let exit = unsafe { &*(buf.as_ptr().add(exit_offset) as *const ExitProcEvent) };
    Ok(Some(ExitNotice {
        pid: exit.process_pid as libc::pid_t,
    }))
}

/// `true` if `pid` is a live, non-zombie process. Reads `/proc/<pid>/stat`'s
/// state field, which is how the rest of userspace distinguishes "exited but
/// not yet reaped" from "actually runnable" — `kill(pid, 0)` alone can't, a
/// zombie still answers to it.
pub fn is_alive(pid: libc::pid_t) -> io::Result<bool> {
    let stat = match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    // Fields: "pid (comm) state ...". `comm` may contain spaces/parens, so
    // split on the *last* ')' rather than whitespace.
    let after_comm = stat
        .rsplit_once(')')
        .map(|(_, rest)| rest)
        .unwrap_or(&stat);
    let state = after_comm.split_whitespace().next();
    Ok(!matches!(state, Some("Z") | None))
}

/// Reaps `pid`, returning its raw wait-status word.
pub fn wait_status(pid: libc::pid_t) -> io::Result<i32> {
    let mut status: libc::c_int = 0;
    syscall!(waitpid(pid, &mut status, 0))?;
    Ok(status)
}
