//! Scenarios: normal exit, signal-terminated exit, a pid that's already a
//! zombie by construction time, and invalid pid arguments. Requires
//! `CAP_NET_ADMIN` to open the process-events connector socket, same
//! privilege requirement as `pidwatch`'s own test suite
//! (`examples/original_source/pidwatch/tests/pw_tests.c`).

use std::cell::Cell;
use std::process::Command;
use std::time::Duration;

use ioutils::{Disposition, ExitStatus, Monitor, ProcessExitSource};

mod util;

fn poll_until_fired(monitor: &mut Monitor, rounds: usize) -> usize {
    let mut fired = 0;
    for _ in 0..rounds {
        fired += monitor.process_events().unwrap();
        if fired > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    fired
}

#[test]
fn normal_exit_is_reported() {
    util::init();

    let child = Command::new("sleep").arg("1").spawn().unwrap();
    let pid = child.id() as libc::pid_t;

    let mut monitor = Monitor::new().unwrap();
    let code = Cell::new(None);
    let mut source = ProcessExitSource::new(pid, |status: ExitStatus| {
        code.set(status.code());
        Ok(Disposition::Remove)
    })
    .unwrap();

    unsafe {
        monitor.add(&mut source).unwrap();
    }

    // The source itself reaps `pid` via `waitpid` once the exit notice
    // arrives; we deliberately never call `child.wait()` ourselves, since
    // that would race the connector for who gets to reap it.
    assert_eq!(poll_until_fired(&mut monitor, 50), 1);
    assert_eq!(code.get(), Some(0));
}

#[test]
fn signal_terminated_exit_is_reported() {
    util::init();

    let child = Command::new("sleep").arg("5").spawn().unwrap();
    let pid = child.id() as libc::pid_t;

    let mut monitor = Monitor::new().unwrap();
    let signal = Cell::new(None);
    let mut source = ProcessExitSource::new(pid, |status: ExitStatus| {
        signal.set(status.signal());
        Ok(Disposition::Remove)
    })
    .unwrap();

    unsafe {
        monitor.add(&mut source).unwrap();
    }

    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }

    assert_eq!(poll_until_fired(&mut monitor, 50), 1);
    assert_eq!(signal.get(), Some(libc::SIGKILL));
}

#[test]
fn zombie_pid_is_rejected_with_esrch() {
    util::init();

    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id() as libc::pid_t;
    // Give it time to exit and sit as a zombie before we look it up; nobody
    // has reaped it yet.
    std::thread::sleep(Duration::from_millis(200));

    let err = ProcessExitSource::new(pid, |_: ExitStatus| Ok(Disposition::Remove));
    assert_eq!(err.err().and_then(|e| e.raw_os_error()), Some(libc::ESRCH));

    let _ = child.wait();
}

#[test]
fn invalid_pid_is_rejected_with_einval() {
    util::init();
    let err = ProcessExitSource::new(-63, |_: ExitStatus| Ok(Disposition::Remove));
    assert_eq!(err.err().and_then(|e| e.raw_os_error()), Some(libc::EINVAL));
}
