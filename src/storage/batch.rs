//! Event framing inside a batch file.
//!
//! Each event is written as a length-prefixed frame with a trailing CRC32:
//!
//! ```text
//! [len: u32 LE][payload: len bytes][crc32(payload): u32 LE]
//! ```
//!
//! Frames are self-delimiting, so a file holding N events decodes back into
//! the same N payloads in write order. A truncated or corrupt tail (crash
//! mid-append) loses only the trailing frames; everything before it is kept.

use crate::error::Result;
use std::io::Write;
use tracing::warn;

/// Bytes of framing overhead per event.
pub const FRAME_OVERHEAD: u64 = 8;

/// Sanity bound on a single frame; anything larger is treated as corruption.
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// On-disk size of one framed event.
pub fn framed_len(payload: &[u8]) -> u64 {
    payload.len() as u64 + FRAME_OVERHEAD
}

/// Append one framed event to a writer.
pub fn write_event(writer: &mut impl Write, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    let checksum = crc32fast::hash(payload);
    writer.write_all(&checksum.to_le_bytes())?;
    Ok(())
}

/// Decode every intact event from a batch file's raw contents.
///
/// Decoding stops at the first truncated or checksum-failing frame; earlier
/// events are returned. The batch is upload-opaque, so decoding is only used
/// by local consumers and tests.
pub fn decode_events(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut events = Vec::new();
    let mut offset = 0usize;

    while bytes.len() - offset >= FRAME_OVERHEAD as usize {
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        if len > MAX_FRAME_LEN || bytes.len() - offset - 8 < len {
            warn!(offset, "truncated or oversized frame, discarding batch tail");
            break;
        }
        let payload = &bytes[offset + 4..offset + 4 + len];
        let stored = u32::from_le_bytes(
            bytes[offset + 4 + len..offset + 8 + len].try_into().unwrap(),
        );
        if stored != crc32fast::hash(payload) {
            warn!(offset, "frame checksum mismatch, discarding batch tail");
            break;
        }
        events.push(payload.to_vec());
        offset += 8 + len;
    }

    events
}
