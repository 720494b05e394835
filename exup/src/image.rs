//! Upload image validation and chunking.
//!
//! The bootloader only understands Intel HEX text. Only the leading `':'` is
//! checked here; record structure is left to the device, which parses and
//! verifies every record before programming.

use crate::error::{Error, Result};
use crate::protocol::{CHUNK_SIZE, HeaderFrame, MAX_PAYLOAD, fnv1a32};
use std::path::Path;

/// Bytes skipped before the first significant character: ASCII space,
/// tab, line feed, carriage return, vertical tab and form feed.
fn is_leading_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// A validated, immutable upload image.
#[derive(Debug, Clone)]
pub struct Image {
    data: Vec<u8>,
    checksum: u32,
}

impl Image {
    /// Validate raw bytes and build an image.
    pub fn validate(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }

        match data.iter().find(|&&b| !is_leading_space(b)) {
            Some(b':') => {},
            _ => {
                return Err(Error::InvalidFormat(
                    "first significant character is not ':'; \
                     the bootloader only accepts Intel HEX"
                        .into(),
                ));
            },
        }

        if data.len() > MAX_PAYLOAD {
            return Err(Error::SizeExceeded {
                size: data.len(),
                max: MAX_PAYLOAD,
            });
        }

        let checksum = fnv1a32(&data);
        Ok(Self { data, checksum })
    }

    /// Read and validate an image file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| Error::ImageUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::validate(data)
    }

    /// Image size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// FNV-1a checksum of the image.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Header frame announcing this image.
    #[allow(clippy::cast_possible_truncation)]
    pub fn header(&self) -> HeaderFrame {
        // Safe cast: size is bounded by MAX_PAYLOAD
        HeaderFrame::new(self.data.len() as u32, self.checksum)
    }

    /// Number of chunks the image is sent in.
    pub fn chunk_count(&self) -> usize {
        self.data.len().div_ceil(CHUNK_SIZE)
    }

    /// Iterate over the image chunks in ascending offset order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk<'_>> {
        self.data
            .chunks(CHUNK_SIZE)
            .enumerate()
            .map(|(index, data)| Chunk {
                index,
                offset: index * CHUNK_SIZE,
                data,
            })
    }
}

/// A contiguous slice of an [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// Position in the chunk sequence.
    pub index: usize,
    /// Byte offset of the first byte in the image.
    pub offset: usize,
    /// Chunk payload.
    pub data: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_payload(len: usize) -> Vec<u8> {
        let mut data = vec![b'0'; len];
        data[0] = b':';
        data
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(Image::validate(Vec::new()), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_binary_rejected() {
        let result = Image::validate(vec![0x0C, 0x94, 0x00, 0x00]);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_whitespace_only_rejected() {
        let result = Image::validate(b" \r\n\t".to_vec());
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_leading_whitespace_allowed() {
        let image = Image::validate(b"\r\n  :00000001FF\r\n".to_vec()).unwrap();
        assert_eq!(image.size(), 17);
        assert_eq!(image.checksum(), fnv1a32(b"\r\n  :00000001FF\r\n"));
    }

    #[test]
    fn test_vertical_tab_and_form_feed_skipped() {
        let image = Image::validate(b"\x0b:00000001FF\n".to_vec()).unwrap();
        assert_eq!(image.size(), 13);
        assert!(Image::validate(b"\x0c\x0b \t:00000001FF\n".to_vec()).is_ok());
        assert!(matches!(
            Image::validate(b"\x0b\x0c".to_vec()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let image = Image::validate(hex_payload(MAX_PAYLOAD)).unwrap();
        assert_eq!(image.size(), 2_093_056);

        match Image::validate(hex_payload(MAX_PAYLOAD + 1)) {
            Err(Error::SizeExceeded { size, max }) => {
                assert_eq!(size, 2_093_057);
                assert_eq!(max, 2_093_056);
            },
            other => panic!("expected SizeExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_format_checked_before_size() {
        let result = Image::validate(vec![0u8; MAX_PAYLOAD + 1]);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_chunking() {
        for (len, count, last) in [(1, 1, 1), (10, 1, 10), (256, 1, 256), (257, 2, 1), (1280, 5, 256), (1200, 5, 176)] {
            let image = Image::validate(hex_payload(len)).unwrap();
            let chunks: Vec<_> = image.chunks().collect();
            assert_eq!(chunks.len(), count, "len {len}");
            assert_eq!(image.chunk_count(), count, "len {len}");
            assert_eq!(chunks.last().unwrap().data.len(), last, "len {len}");
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i);
                assert_eq!(chunk.offset, i * CHUNK_SIZE);
            }
        }
    }

    #[test]
    fn test_header_matches_image() {
        let image = Image::validate(hex_payload(300)).unwrap();
        let header = image.header();
        assert_eq!(header.size, 300);
        assert_eq!(header.checksum, image.checksum());
    }

    #[test]
    fn test_from_file_missing() {
        let result = Image::from_file("/nonexistent/exup/image.hex");
        assert!(matches!(result, Err(Error::ImageUnreadable { .. })));
    }
}
