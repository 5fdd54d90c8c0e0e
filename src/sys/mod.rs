//! Linux-specific bits. The crate is explicitly not portable (spec.md §1
//! non-goals), so unlike the teacher crate there is exactly one selector
//! backend and no per-platform `cfg` fan-out.

pub(crate) mod epoll;
pub(crate) mod netlink;

pub use epoll::Selector;
