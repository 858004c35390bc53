//! Dual-mode incremental framing.
//!
//! A connection carries two interleaved unit kinds on one byte stream:
//! newline-terminated text lines, and binary file frames announced by a
//! magic value at the start of the accumulation buffer.
//!
//! Client -> relay file frame:
//!
//! ```text
//! [0..4]   magic 0xFA57F11E (u32 LE)
//! [4..8]   name length (i32 LE)
//! [8..12]  data length (i32 LE)
//! [12..]   name bytes (UTF-8), then data bytes
//! ```
//!
//! Relay -> client frames additionally carry the original sender's session
//! id between the magic and the name length:
//!
//! ```text
//! [0..4]   magic 0xFA57F11E (u32 LE)
//! [4..8]   sender id (i32 LE)
//! [8..12]  name length (i32 LE)
//! [12..16] data length (i32 LE)
//! [16..]   name bytes (UTF-8), then data bytes
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Marks the start of a binary file frame.
pub const FILE_MAGIC: u32 = 0xFA57_F11E;

/// Maximum file name length in bytes.
pub const MAX_NAME_LEN: usize = 1024;

/// Maximum file payload size (10 MiB).
pub const MAX_DATA_LEN: usize = 10 * 1024 * 1024;

/// Accumulation ceiling for buffers holding no file frame; past this with
/// no complete unit the buffer is discarded.
pub const MAX_BUFFER: usize = 10 * 1024 * 1024;

/// Which header layout to expect for file frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// magic + name length + data length (what clients upload).
    ClientToRelay,
    /// magic + sender id + name length + data length (what the relay emits).
    RelayToClient,
}

impl WireFormat {
    fn header_len(self) -> usize {
        match self {
            WireFormat::ClientToRelay => 12,
            WireFormat::RelayToClient => 16,
        }
    }
}

/// One complete protocol unit extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    /// A text line, newline (and any trailing CR) stripped. May be empty.
    Line(String),
    /// A complete reassembled file frame.
    File(FileFrame),
}

/// A reassembled file frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFrame {
    pub name: String,
    pub data: Bytes,
    /// Present only on relay -> client frames.
    pub sender_id: Option<i32>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// A file frame header failed validation. The buffer was discarded;
    /// there is no byte-wise resynchronization.
    #[error("invalid file packet header")]
    InvalidFilePacket,
    /// The buffer grew past [`MAX_BUFFER`] without completing a unit.
    #[error("input exceeded the buffer ceiling without a complete unit")]
    Overflow,
}

/// Attempt to extract one unit from the front of `buf`.
///
/// Returns `Ok(Some((unit, consumed)))` when a complete unit is buffered,
/// `Ok(None)` when more bytes are needed, and an error when the buffered
/// prefix can never form a valid unit. The function is stateless and
/// re-parsing the same prefix costs O(header size), so callers re-enter
/// freely as bytes arrive.
pub fn extract_unit(
    buf: &[u8],
    format: WireFormat,
) -> Result<Option<(Unit, usize)>, FrameError> {
    if starts_with_magic(buf) {
        return extract_file(buf, format);
    }

    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let mut line = &buf[..pos];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let text = String::from_utf8_lossy(line).into_owned();
        return Ok(Some((Unit::Line(text), pos + 1)));
    }

    Ok(None)
}

fn starts_with_magic(buf: &[u8]) -> bool {
    buf.len() >= 4 && u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) == FILE_MAGIC
}

fn extract_file(
    buf: &[u8],
    format: WireFormat,
) -> Result<Option<(Unit, usize)>, FrameError> {
    let header_len = format.header_len();
    if buf.len() < header_len {
        return Ok(None);
    }

    let mut at = 4;
    let sender_id = match format {
        WireFormat::RelayToClient => {
            let id = i32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
            at += 4;
            Some(id)
        }
        WireFormat::ClientToRelay => None,
    };
    let name_len = i32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
    let data_len = i32::from_le_bytes(buf[at + 4..at + 8].try_into().unwrap());

    if name_len <= 0
        || name_len as usize > MAX_NAME_LEN
        || data_len < 0
        || data_len as usize > MAX_DATA_LEN
    {
        return Err(FrameError::InvalidFilePacket);
    }
    let name_len = name_len as usize;
    let data_len = data_len as usize;

    let total = header_len + name_len + data_len;
    if buf.len() < total {
        return Ok(None);
    }

    let name = String::from_utf8_lossy(&buf[header_len..header_len + name_len]).into_owned();
    let data = Bytes::copy_from_slice(&buf[header_len + name_len..total]);

    Ok(Some((Unit::File(FileFrame { name, data, sender_id }), total)))
}

/// Per-connection incremental framer. Owns the accumulation buffer; feed
/// raw reads in, pull complete units out. Empty text lines are consumed
/// silently.
pub struct Framer {
    buf: BytesMut,
    format: WireFormat,
}

impl Framer {
    pub fn new(format: WireFormat) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            format,
        }
    }

    /// Append freshly read bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete unit, if one is buffered.
    ///
    /// On error the accumulation buffer has been discarded and the framer
    /// accepts subsequent input; the connection stays usable.
    pub fn next_unit(&mut self) -> Result<Option<Unit>, FrameError> {
        loop {
            match extract_unit(&self.buf, self.format) {
                Ok(Some((unit, consumed))) => {
                    let _ = self.buf.split_to(consumed);
                    match unit {
                        Unit::Line(line) if line.is_empty() => continue,
                        unit => return Ok(Some(unit)),
                    }
                }
                Ok(None) => {
                    // A buffer that starts with a validated file header is
                    // bounded by the declared frame size and may legally
                    // sit above the ceiling while its tail arrives.
                    if self.buf.len() > MAX_BUFFER && !starts_with_magic(&self.buf) {
                        self.buf.clear();
                        return Err(FrameError::Overflow);
                    }
                    return Ok(None);
                }
                Err(e) => {
                    self.buf.clear();
                    return Err(e);
                }
            }
        }
    }
}

/// Encode a client -> relay file frame.
pub fn encode_client_frame(name: &str, data: &[u8]) -> Bytes {
    let name = name.as_bytes();
    let mut buf = BytesMut::with_capacity(12 + name.len() + data.len());
    buf.put_u32_le(FILE_MAGIC);
    buf.put_i32_le(name.len() as i32);
    buf.put_i32_le(data.len() as i32);
    buf.put_slice(name);
    buf.put_slice(data);
    buf.freeze()
}

/// Encode a relay -> client file frame carrying the original sender's
/// session id.
pub fn encode_relay_frame(sender_id: i32, name: &str, data: &[u8]) -> Bytes {
    let name = name.as_bytes();
    let mut buf = BytesMut::with_capacity(16 + name.len() + data.len());
    buf.put_u32_le(FILE_MAGIC);
    buf.put_i32_le(sender_id);
    buf.put_i32_le(name.len() as i32);
    buf.put_i32_le(data.len() as i32);
    buf.put_slice(name);
    buf.put_slice(data);
    buf.freeze()
}
