//! Record encoder
//!
//! Writer-side counterpart of the decoder, used to feed in-process
//! segments.

use bytes::{BufMut, Bytes, BytesMut};

use super::decoder::{BACKEND_MARKER, CLIENT_MARKER, CURRENT_ID_MASK, LEGACY_ID_MASK, LEN_MASK};
use super::{FormatVersion, Side};

/// Longest payload that fits the length field with its NUL
pub const MAX_PAYLOAD: usize = LEN_MASK as usize - 1;

fn markers(side: Side) -> u32 {
    match side {
        Side::Client => CLIENT_MARKER,
        Side::Backend => BACKEND_MARKER,
        Side::None => 0,
    }
}

/// Encode a record in the given format version
///
/// Ids wider than the version allows are masked; payloads longer than
/// [`MAX_PAYLOAD`] are cut.
pub fn encode_record(
    version: FormatVersion,
    tag: u8,
    vxid: u64,
    side: Side,
    payload: &[u8],
) -> Bytes {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let length = payload.len() + 1;
    let padded = length.div_ceil(4) * 4;

    let mut buf = BytesMut::with_capacity(version.header_words() * 4 + padded);
    let w0 = (tag as u32) << 24 | (version as u32) << 16 | length as u32;
    buf.put_u32_le(w0);

    match version {
        FormatVersion::Legacy => {
            buf.put_u32_le((vxid as u32) & LEGACY_ID_MASK | markers(side));
        }
        FormatVersion::Current => {
            let id = vxid & CURRENT_ID_MASK;
            buf.put_u32_le(id as u32);
            buf.put_u32_le((id >> 32) as u32 | markers(side));
        }
    }

    buf.put_slice(payload);
    buf.put_bytes(0, padded - payload.len());
    buf.freeze()
}
