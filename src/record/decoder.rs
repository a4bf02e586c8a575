//! Record decoder
//!
//! Pure functions over the raw bytes of one record. The version is read
//! from every header; callers never choose it.

use bytes::Bytes;

use crate::error::{Result, VslError};

use super::tags::tag_name;
use super::{FormatVersion, Record, Side};

/// Payload length, low 16 bits of word 0
pub const LEN_MASK: u32 = 0xffff;

/// Client marker bit (word 1 in legacy, word 2 in current format)
pub const CLIENT_MARKER: u32 = 1 << 30;

/// Backend marker bit (word 1 in legacy, word 2 in current format)
pub const BACKEND_MARKER: u32 = 1 << 31;

/// Legacy transaction id: word 1 without the marker bits
pub const LEGACY_ID_MASK: u32 = !(3 << 30);

/// Current transaction id: top 13 bits are reserved for markers
pub const CURRENT_ID_MASK: u64 = u64::MAX >> 13;

const TAG_SHIFT: u32 = 24;
const VERSION_SHIFT: u32 = 16;
const VERSION_MASK: u32 = 0x3;

/// Decoded header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: u8,
    pub length: u16,
    pub version: FormatVersion,
    pub vxid: u64,
    pub side: Side,
}

impl Header {
    /// Byte offset of the payload
    pub fn payload_offset(&self) -> usize {
        self.version.header_words() * 4
    }

    /// Total record size in bytes, payload padded to a whole word
    pub fn record_len(&self) -> usize {
        self.payload_offset() + (self.length as usize).div_ceil(4) * 4
    }
}

#[inline]
fn word(bytes: &[u8], index: usize) -> u32 {
    let at = index * 4;
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn side_from_markers(markers: u32) -> Side {
    if markers & CLIENT_MARKER != 0 {
        Side::Client
    } else if markers & BACKEND_MARKER != 0 {
        Side::Backend
    } else {
        Side::None
    }
}

/// Decode the header at the start of `bytes`
///
/// Only word 0 is read before the version is known; an unknown version
/// fails without touching the id words.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < 4 {
        return Err(VslError::Truncated(format!(
            "need 4 bytes for word 0, got {}",
            bytes.len()
        )));
    }

    let w0 = word(bytes, 0);
    let version = match (w0 >> VERSION_SHIFT) & VERSION_MASK {
        0 => FormatVersion::Legacy,
        1 => FormatVersion::Current,
        v => return Err(VslError::UnknownFormat { version: v as u8 }),
    };

    let needed = version.header_words() * 4;
    if bytes.len() < needed {
        return Err(VslError::Truncated(format!(
            "version {} header needs {} bytes, got {}",
            version as u8,
            needed,
            bytes.len()
        )));
    }

    let (vxid, side) = match version {
        FormatVersion::Legacy => {
            let w1 = word(bytes, 1);
            ((w1 & LEGACY_ID_MASK) as u64, side_from_markers(w1))
        }
        FormatVersion::Current => {
            let w1 = word(bytes, 1);
            let w2 = word(bytes, 2);
            let id = ((w2 as u64) << 32 | w1 as u64) & CURRENT_ID_MASK;
            (id, side_from_markers(w2))
        }
    };

    Ok(Header {
        tag: (w0 >> TAG_SHIFT) as u8,
        length: (w0 & LEN_MASK) as u16,
        version,
        vxid,
        side,
    })
}

/// Size in bytes of the record starting at `bytes`
pub fn record_len(bytes: &[u8]) -> Result<usize> {
    decode_header(bytes).map(|h| h.record_len())
}

/// Decode one full record; the payload shares `raw`'s buffer
pub fn decode(raw: &Bytes) -> Result<Record> {
    let header = decode_header(raw)?;

    let start = header.payload_offset();
    let length = header.length as usize;
    if raw.len() < start + length {
        return Err(VslError::Truncated(format!(
            "payload of {} bytes at offset {} exceeds record of {} bytes",
            length,
            start,
            raw.len()
        )));
    }

    // Length counts the NUL terminator
    let payload = raw.slice(start..start + length.saturating_sub(1));

    Ok(Record {
        vxid: header.vxid,
        tag: tag_name(header.tag).unwrap_or(""),
        tag_index: header.tag,
        side: header.side,
        payload,
    })
}
