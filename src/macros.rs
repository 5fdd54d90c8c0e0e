//! Small helper macros, kept separate so `lib.rs` stays readable.

/// Call a libc function, converting a `-1` return into `io::Result::Err`.
///
/// Mirrors the pattern used throughout the selector and waker backends of
/// the crate this is grounded on: check the raw return value, reach for
/// `io::Error::last_os_error()` on failure, and let the caller avoid
/// repeating that boilerplate at every FFI boundary.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}
