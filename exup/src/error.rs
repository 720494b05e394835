//! Error types for exup.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for exup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for exup operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The port was used after it had been closed.
    #[error("Port is closed")]
    PortClosed,

    /// The image file could not be read.
    #[error("Cannot read image {}: {source}", .path.display())]
    ImageUnreadable {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The image file is empty.
    #[error("Empty file")]
    EmptyInput,

    /// The image does not look like a text-encoded HEX record stream.
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    /// The image does not fit into the usable flash area.
    #[error(
        "Payload of {size} bytes exceeds usable flash capacity of {max} bytes; \
         the last 4KB are reserved for the footer sector"
    )]
    SizeExceeded {
        /// Actual image size.
        size: usize,
        /// Largest accepted image size.
        max: usize,
    },

    /// The device never answered the header with `OK`.
    #[error("Handshake failed: no OK within {:.1}s", .window.as_secs_f32())]
    HandshakeTimedOut {
        /// Length of the handshake window.
        window: Duration,
        /// Device lines seen while waiting.
        lines: Vec<String>,
    },

    /// The device answered a chunk with NAK.
    #[error("Chunk at offset {offset} rejected (NAK)")]
    ChunkRejected {
        /// Offset of the rejected chunk.
        offset: usize,
        /// Diagnosis lines the device printed after the NAK.
        diagnostics: Vec<String>,
    },

    /// The device answered a chunk with something other than ACK/NAK, or not at all.
    #[error("No ACK at {offset}, resp={}", format_response(.response))]
    NoAcknowledgment {
        /// Offset of the unacknowledged chunk.
        offset: usize,
        /// Raw response byte, `None` on timeout.
        response: Option<u8>,
    },

    /// The transfer completed but the device did not report `DONE`.
    #[error("Final status not DONE (last line: {})", .last_line.as_deref().unwrap_or("<none>"))]
    FinalNotDone {
        /// Last non-empty line seen in the final window.
        last_line: Option<String>,
    },
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any device I/O.
    Input,
    /// Channel-level failure (open, read, write).
    Transport,
    /// The device deviated from the upload protocol.
    Protocol,
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ImageUnreadable { .. }
            | Self::EmptyInput
            | Self::InvalidFormat(_)
            | Self::SizeExceeded { .. } => ErrorClass::Input,
            Self::HandshakeTimedOut { .. }
            | Self::ChunkRejected { .. }
            | Self::NoAcknowledgment { .. }
            | Self::FinalNotDone { .. } => ErrorClass::Protocol,
            _ => ErrorClass::Transport,
        }
    }
}

fn format_response(response: &Option<u8>) -> String {
    match response {
        Some(b) => format!("0x{b:02X}"),
        None => "<timeout>".to_string(),
    }
}
