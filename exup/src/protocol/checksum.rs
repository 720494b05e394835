//! FNV-1a 32-bit checksum.
//!
//! The bootloader recomputes this over the image it stored in SPI flash and
//! refuses to apply it on mismatch, so the algorithm must stay bit-exact.

/// FNV-1a offset basis.
pub const FNV_OFFSET: u32 = 0x811C9DC5;

/// FNV-1a prime.
pub const FNV_PRIME: u32 = 0x01000193;

/// Compute the FNV-1a 32-bit hash of `data`.
pub fn fnv1a32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_offset_basis() {
        assert_eq!(fnv1a32(b""), 0x811C9DC5);
    }

    #[test]
    fn test_reference_vectors() {
        assert_eq!(fnv1a32(b"a"), 0xE40C292C);
        assert_eq!(fnv1a32(b"foobar"), 0xBF9CF968);
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        assert_eq!(fnv1a32(&data), fnv1a32(&data));
        assert_ne!(fnv1a32(&data), fnv1a32(&data[1..]));
    }
}
