//! Transport Module
//!
//! Boundary to the shared segment published by the log writer.
//!
//! ## Responsibilities
//! - Locate and attach a segment by name
//! - Hand out cursors over the circular log region
//! - Report writer restarts
//! - Walk the counter directory through a token-carrying callback
//!
//! Attaching, mapping and detaching the segment belong to the transport;
//! everything above it only sees these traits. [`MemorySegment`] is the
//! in-process implementation.

mod cursor;
mod directory;
mod memory;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use bytes::Bytes;

use crate::registry::Token;

pub use directory::{SegmentDirectory, DEFAULT_SEGMENT};
pub use memory::MemorySegment;

/// Cursor start/stop behaviour; flags combine with `|`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CursorOptions(u32);

impl CursorOptions {
    /// Start at the writer's head instead of the oldest retained record
    pub const TAIL: Self = Self(1 << 0);

    /// Report end-of-stream instead of idle once caught up
    pub const BATCH: Self = Self(1 << 1);

    /// Report end-of-stream at the head observed when the cursor was made
    pub const TAILSTOP: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits; unknown bits are dropped
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0b111)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CursorOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CursorOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for CursorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::TAIL) {
            names.push("TAIL");
        }
        if self.contains(Self::BATCH) {
            names.push("BATCH");
        }
        if self.contains(Self::TAILSTOP) {
            names.push("TAILSTOP");
        }
        write!(f, "CursorOptions({})", names.join(" | "))
    }
}

/// Writer liveness as seen since the previous poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    Unchanged,

    /// The writer restarted; cursors made before it are abandoned
    Restarted,
}

/// Outcome of advancing a cursor by one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorStep {
    /// Raw bytes of the next record
    Record(Bytes),

    /// Caught up with the writer
    Idle,

    /// Cursor reached its stop condition
    End,

    /// Writer restarted; cursor is dead
    Abandoned,

    /// Cursor position was evicted; cursor is dead
    Overrun,
}

/// Read position in the log region
pub trait Cursor: Send {
    fn next(&mut self) -> CursorStep;
}

/// One entry of the counter directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterPoint<'a> {
    /// Section type, e.g. `MAIN`, `SMA`, `VBE`
    pub section: &'a str,

    /// Instance identity within the section; empty for singletons
    pub ident: &'a str,

    pub field: &'a str,
    pub value: u64,
}

impl CounterPoint<'_> {
    /// Dotted name: `section.[ident.]field`
    pub fn name(&self) -> String {
        if self.ident.is_empty() {
            format!("{}.{}", self.section, self.field)
        } else {
            format!("{}.{}.{}", self.section, self.ident, self.field)
        }
    }
}

/// Counter visitor; a non-zero return stops the walk
pub type CounterFn = fn(&CounterPoint<'_>, Token) -> i32;

/// An attached segment
pub trait Transport: Send + Sync {
    /// Make a new cursor; failures are transient and carry the diagnostic
    fn cursor(&self, options: CursorOptions) -> std::result::Result<Box<dyn Cursor>, String>;

    /// Poll for a writer restart since the last call
    fn status(&self) -> WriterStatus;

    /// Visit every counter; returns the first non-zero callback result
    fn iter_counters(&self, callback: CounterFn, token: Token) -> i32;

    /// Release the segment; called once, after every cursor is gone
    fn detach(&self) {}
}

/// Resolves segment names to attached transports
pub trait Locator: Send + Sync {
    fn attach(&self, name: &str) -> std::result::Result<Arc<dyn Transport>, String>;
}
