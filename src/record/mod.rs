//! Record Module
//!
//! Binary record layout of the shared log and its decoder.
//!
//! ## Responsibilities
//! - Decode record headers of both wire-format versions
//! - Classify records as client, backend or neither
//! - Map tag indexes to names through the writer's tag table
//!
//! ## Record Layout
//! All words are little-endian `u32`. Word 0 is shared by both versions:
//! ```text
//! ┌──────────┬─────────┬──────────┬──────────────────┐
//! │ Tag (8)  │ - (6)   │ Ver (2)  │   Length (16)    │
//! └──────────┴─────────┴──────────┴──────────────────┘
//! ```
//!
//! ### Version 0 (legacy)
//! ```text
//! ┌────────┬──────────────────────────────┬─────────────────┐
//! │ Word 0 │ Word 1: B C id(30)           │ Payload ...     │
//! └────────┴──────────────────────────────┴─────────────────┘
//! ```
//!
//! ### Version 1 (current)
//! ```text
//! ┌────────┬──────────────┬────────────────────────┬─────────────┐
//! │ Word 0 │ Word 1: id   │ Word 2: B C - id(19)   │ Payload ... │
//! └────────┴──────────────┴────────────────────────┴─────────────┘
//! ```
//!
//! `C` and `B` are the client and backend markers. The length field counts
//! the payload bytes including a trailing NUL; the payload is padded to a
//! word boundary.

mod decoder;
mod encoder;
pub mod tags;

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

pub use decoder::{
    decode, decode_header, record_len, Header, BACKEND_MARKER, CLIENT_MARKER, CURRENT_ID_MASK,
    LEGACY_ID_MASK, LEN_MASK,
};
pub use encoder::encode_record;

/// Wire-format version, read per record from header word 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FormatVersion {
    /// 30-bit transaction ids, markers in word 1
    Legacy = 0,

    /// 51-bit transaction ids spanning words 1-2, markers in word 2
    Current = 1,
}

impl FormatVersion {
    /// Number of header words preceding the payload
    pub fn header_words(self) -> usize {
        match self {
            FormatVersion::Legacy => 2,
            FormatVersion::Current => 3,
        }
    }
}

/// Which side of the proxy a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Backend,
    None,
}

impl Side {
    /// One-character code used in log listings
    pub fn as_char(self) -> char {
        match self {
            Side::Client => 'c',
            Side::Backend => 'b',
            Side::None => '-',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A decoded log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Transaction id the record belongs to (0 = not part of a transaction)
    pub vxid: u64,

    /// Tag name from the tag table ("" for unassigned indexes)
    pub tag: &'static str,

    /// Raw tag index
    pub tag_index: u8,

    /// Client/backend classification
    pub side: Side,

    /// Payload without the trailing NUL
    pub payload: Bytes,
}

impl Record {
    /// Payload as text; invalid UTF-8 is replaced rather than rejected
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10} {:<14} {} {}",
            self.vxid,
            self.tag,
            self.side,
            self.payload_text()
        )
    }
}
