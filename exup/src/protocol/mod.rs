//! EXUP wire protocol.
//!
//! ```text
//! host                                   device
//!  | -- "EXUP" | size:u32 | fnv1a:u32 --> |   header (12 bytes, LE)
//!  | <------------- "OK\n" -------------- |   handshake line
//!  | -- chunk (<= 256 bytes) -----------> |
//!  | <------------- ACK / NAK ----------- |   one byte per chunk
//!  |              ...                     |
//!  | <---------- "DONE\n" / "ERR\n" ----- |   final status line
//! ```
//!
//! Device diagnostics share the same stream as text lines. Which channel a
//! byte belongs to is decided only by where in the session it is read.

pub mod checksum;
pub mod drain;
pub mod handshake;
pub mod header;
pub mod transfer;

pub use checksum::fnv1a32;
pub use handshake::negotiate;
pub use header::HeaderFrame;
pub use transfer::{ChunkTransmitter, TransferConfig};

/// Single-byte chunk acknowledgment codes.
pub mod control {
    /// Chunk accepted.
    pub const ACK: u8 = 0x06;
    /// Chunk rejected.
    pub const NAK: u8 = 0x15;
}

/// Line tokens the device prints at protocol checkpoints.
pub mod token {
    /// Header accepted.
    pub const OK: &str = "OK";
    /// Image verified and committed.
    pub const DONE: &str = "DONE";
    /// Image rejected after transfer.
    pub const ERR: &str = "ERR";
}

/// Total size of the external SPI flash.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Sector at the end of flash reserved for the image footer.
pub const FOOTER_RESERVATION: usize = 4096;

/// Largest image the device accepts.
pub const MAX_PAYLOAD: usize = FLASH_SIZE - FOOTER_RESERVATION;

/// Payload bytes per chunk.
pub const CHUNK_SIZE: usize = 256;

/// Baud rate the bootloader listens on.
pub const DEFAULT_BAUD: u32 = 115200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_constants() {
        assert_eq!(FLASH_SIZE, 2_097_152);
        assert_eq!(MAX_PAYLOAD, 2_093_056);
    }
}
