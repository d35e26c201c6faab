//! Length-framed encoding of one [`DatasetData`] value
//!
//! A frame is the magic `DSFR`, the payload length as a little-endian `u64`,
//! then the bincode payload. Exactly one frame travels over a pipe; bytes
//! after it are a stream error.

use std::io::Write;

use bincode::Options;
use dsetio_core::buffer::DatasetData;
use dsetio_core::bytes;
use dsetio_core::error::{Error, Result};
use static_assertions::const_assert;

/// Frame magic
pub const MAGIC: [u8; 4] = *b"DSFR";

/// Bytes before the payload
pub const HEADER_LEN: usize = 12;

/// Largest accepted payload
pub const MAX_PAYLOAD: u64 = 16 << 30;

const_assert!(HEADER_LEN == MAGIC.len() + std::mem::size_of::<u64>());

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PAYLOAD)
        .reject_trailing_bytes()
}

/// Encode `data` as one frame
pub fn encode(data: &DatasetData) -> Result<Vec<u8>> {
    let payload = payload_options().serialize(data)?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Encode `data` and write it with a single `write_all`
pub fn write_frame<W: Write>(writer: &mut W, data: &DatasetData) -> Result<()> {
    let frame = encode(data)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// How much of a frame has arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProgress {
    /// More bytes are needed
    Incomplete,
    /// The whole frame is present and nothing follows it
    Complete,
}

/// Validate the bytes received so far without decoding the payload
///
/// Fails as soon as the header is malformed, announces an oversized payload,
/// or more bytes than one frame have arrived.
pub fn check_progress(received: &[u8]) -> Result<FrameProgress> {
    let Some(total) = frame_len(received)? else {
        return Ok(FrameProgress::Incomplete);
    };
    match received.len() {
        n if n < total => Ok(FrameProgress::Incomplete),
        n if n == total => Ok(FrameProgress::Complete),
        n => Err(Error::DecodeStream(format!(
            "{} unexpected bytes after the frame",
            n - total
        ))),
    }
}

/// Total frame length, once the header has arrived
fn frame_len(received: &[u8]) -> Result<Option<usize>> {
    if received.len() < HEADER_LEN {
        if !MAGIC.starts_with(&received[..received.len().min(MAGIC.len())]) {
            return Err(Error::DecodeStream("stream does not start with a frame".into()));
        }
        return Ok(None);
    }
    if received[..MAGIC.len()] != MAGIC {
        return Err(Error::DecodeStream("stream does not start with a frame".into()));
    }
    let payload = bytes::u64_from_le(&received[MAGIC.len()..HEADER_LEN])?;
    if payload > MAX_PAYLOAD {
        return Err(Error::DecodeStream(format!(
            "frame announces {payload} bytes, more than the {MAX_PAYLOAD} byte limit"
        )));
    }
    let payload = usize::try_from(payload)
        .map_err(|_| Error::DecodeStream(format!("frame of {payload} bytes does not fit in memory")))?;
    Ok(Some(HEADER_LEN + payload))
}

/// Decode a complete stream holding exactly one frame
pub fn decode(received: &[u8]) -> Result<DatasetData> {
    if received.is_empty() {
        return Err(Error::DecodeStream("no data received".into()));
    }
    if check_progress(received)? == FrameProgress::Incomplete {
        return Err(Error::DecodeStream(format!(
            "stream truncated after {} bytes",
            received.len()
        )));
    }
    let data: DatasetData = payload_options()
        .deserialize(&received[HEADER_LEN..])
        .map_err(|e| Error::DecodeStream(format!("malformed payload: {e}")))?;
    data.check_consistent(None)
        .map_err(|e| Error::DecodeStream(e.to_string()))?;
    Ok(data)
}
