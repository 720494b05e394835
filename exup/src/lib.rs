//! # exup
//!
//! Host side of the EXUP serial bootloader upload protocol.
//!
//! An upload is a single attempt that:
//!
//! - validates an Intel HEX text image against the flash capacity
//! - announces it with a 12-byte header carrying its size and FNV-1a checksum
//! - streams it in 256-byte chunks, each acknowledged by one byte
//! - waits for the device to report `DONE`
//!
//! Device log lines interleaved with the protocol are surfaced through an
//! [`UploadObserver`].
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: Serialization support for state and outcome types
//!
//! ## Example
//!
//! ```rust,no_run
//! use exup::{Image, SerialConfig, SessionOutcome, UploadSession};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = Image::from_file("firmware.hex")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let session = UploadSession::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!         let result = session.run(&image);
//!         println!("{:?}", SessionOutcome::from_result(&result));
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod events;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    clock::{Clock, ManualClock, SystemClock},
    error::{Error, ErrorClass, Result},
    events::{
        LogObserver, NullObserver, RecordingObserver, SessionState, UploadEvent, UploadObserver,
    },
    image::{Chunk, Image},
    port::{Port, Reply, ScriptHandle, ScriptedPort, SerialConfig},
    protocol::{ChunkTransmitter, HeaderFrame, TransferConfig, fnv1a32, negotiate},
    session::{SessionConfig, SessionOutcome, UploadSession},
};
