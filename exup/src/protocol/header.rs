//! Upload header frame.
//!
//! ```text
//! +--------+----------+----------+
//! | "EXUP" | size LE  | fnv1a LE |
//! +--------+----------+----------+
//! |   4    |    4     |    4     |
//! +--------+----------+----------+
//! ```

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Header magic.
pub const MAGIC: [u8; 4] = *b"EXUP";

/// Encoded header length.
pub const HEADER_LEN: usize = 12;

/// Preamble announcing the image size and checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFrame {
    /// Image size in bytes.
    pub size: u32,
    /// FNV-1a checksum of the image.
    pub checksum: u32,
}

impl HeaderFrame {
    /// Create a header for the given size and checksum.
    pub fn new(size: u32, checksum: u32) -> Self {
        Self { size, checksum }
    }

    /// Encode the frame.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.write_u32::<LittleEndian>(self.size).unwrap();
        buf.write_u32::<LittleEndian>(self.checksum).unwrap();
        buf
    }

    /// Decode a frame, returning `None` on bad length or magic.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != HEADER_LEN || data[..4] != MAGIC {
            return None;
        }
        Some(Self {
            size: LittleEndian::read_u32(&data[4..8]),
            checksum: LittleEndian::read_u32(&data[8..12]),
        })
    }
}
