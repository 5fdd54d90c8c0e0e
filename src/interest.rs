//! Readiness-interest and observed-readiness bitsets.
//!
//! Grounded on `mio`'s `Interests` (`src/interests.rs`): a small
//! `#[repr(transparent)]` wrapper over an integer with `const` flag values
//! and a `BitOr` impl, rather than pulling in the `bitflags` crate for two
//! bits.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

const READABLE: u8 = 0b001;
const WRITABLE: u8 = 0b010;

/// Readiness a [`crate::source::SourceRecord`] is interested in. Non-empty by
/// construction (spec invariant: interest must be a non-empty subset of
/// `{Readable, Writable}`).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub const READABLE: Interest = Interest(READABLE);
    pub const WRITABLE: Interest = Interest(WRITABLE);

    pub const fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub const fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub(crate) const fn bits(self) -> u8 {
        self.0
    }

    /// `true` for any non-empty combination, `false` for the zero bitset. Only
    /// the zero value can arise from user code going through `BitOr`/consts,
    /// but [`crate::source::SourceRecord::new`] checks this explicitly since
    /// a bare `Interest(0)` could otherwise be constructed by mistake.
    pub(crate) const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interest {
    type Output = Interest;
    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_readable() {
            parts.push("READABLE");
        }
        if self.is_writable() {
            parts.push("WRITABLE");
        }
        write!(f, "{}", parts.join(" | "))
    }
}

const HUP: u8 = 0b0100;
const ERROR: u8 = 0b1000;

/// Readiness bits observed by the monitor for a source during one dispatch
/// round. Superset of [`Interest`]: also carries hangup/error, which a source
/// callback may observe even when not explicitly requested (spec.md §3:
/// "last_events: Subset of {Readable, Writable, HangUp, Error}").
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    pub const EMPTY: Readiness = Readiness(0);
    pub const READABLE: Readiness = Readiness(READABLE);
    pub const WRITABLE: Readiness = Readiness(WRITABLE);
    pub const HUP: Readiness = Readiness(HUP);
    pub const ERROR: Readiness = Readiness(ERROR);

    pub const fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub const fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub const fn is_hup(self) -> bool {
        self.0 & HUP != 0
    }

    pub const fn is_error(self) -> bool {
        self.0 & ERROR != 0
    }

    /// Whether any bit is set that the source should act on: any requested
    /// interest bit, or an error/hangup bit (spec.md §3: "`on_ready` is
    /// invoked when `last_events ∩ interest` is non-empty or an error bit is
    /// set").
    pub(crate) fn intersects_interest(self, interest: Interest) -> bool {
        (self.0 & interest.bits()) != 0 || self.is_error() || self.is_hup()
    }
}

impl BitOr for Readiness {
    type Output = Readiness;
    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_readable() {
            parts.push("READABLE");
        }
        if self.is_writable() {
            parts.push("WRITABLE");
        }
        if self.is_hup() {
            parts.push("HUP");
        }
        if self.is_error() {
            parts.push("ERROR");
        }
        if parts.is_empty() {
            return write!(f, "EMPTY");
        }
        write!(f, "{}", parts.join(" | "))
    }
}
