//! A small, Linux-only event monitor: an epoll-backed readiness dispatcher
//! over a handful of purpose-built sources — blocked signals
//! ([`signal::SignalSource`]), a single process's exit
//! ([`process_exit::ProcessExitSource`]), fixed-size framed messages off a
//! pipe or socket ([`message::MessageSource`]), and a thin adapter
//! ([`raw_fd::RawFdSource`]) for any other descriptor that doesn't warrant
//! its own source type.
//!
//! Every registration is edge-triggered *and* one-shot: once a source fires,
//! it stays disarmed until its `on_ready` callback's returned
//! [`source::Disposition`] re-arms it (or removes it). [`monitor::Monitor`]
//! never blocks — `process_events` is a single non-blocking poll, leaving the
//! caller free to fold it into whatever event loop (or raw `select`/`poll`
//! on [`Monitor`]'s own fd, via `AsRawFd`) already exists.
//!
//! This crate targets Linux specifically (no portability layer, unlike the
//! crate its selector and error-handling idioms are grounded on) — see
//! `SPEC_FULL.md` for the full rationale.

#[macro_use]
mod macros;

pub mod interest;
pub mod list;
pub mod message;
pub mod monitor;
pub mod process_exit;
pub mod raw_fd;
pub mod signal;
pub mod source;
mod sys;

pub use interest::{Interest, Readiness};
pub use message::MessageSource;
pub use monitor::Monitor;
pub use process_exit::{wait, ExitStatus, ProcessExitSource};
pub use raw_fd::RawFdSource;
pub use signal::SignalSource;
pub use source::{Disposition, Source, SourceRecord};
