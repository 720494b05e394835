//! Header handshake.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{UploadEvent, UploadObserver};
use crate::port::Port;
use crate::protocol::{HeaderFrame, token};
use log::debug;
use std::time::Duration;

/// How long the device has to answer the header.
pub const HANDSHAKE_WINDOW: Duration = Duration::from_secs(5);

/// Send the header and wait for the device to answer `OK`.
///
/// Only a line that is exactly `OK` after trimming accepts the header. Every
/// other non-empty line, `ERR` included, is surfaced and the wait goes on
/// until `window` runs out.
pub fn negotiate<P: Port + ?Sized>(
    port: &mut P,
    clock: &dyn Clock,
    header: &HeaderFrame,
    window: Duration,
    observer: &dyn UploadObserver,
) -> Result<()> {
    debug!(
        "Sending header: size={} fnv1a=0x{:08X}",
        header.size, header.checksum
    );
    port.write_all_bytes(&header.build())?;

    let start = clock.now();
    let mut lines = Vec::new();
    while clock
        .now()
        .saturating_duration_since(start)
        < window
    {
        let Some(line) = port.read_line()? else {
            continue;
        };
        if line.is_empty() {
            continue;
        }

        observer.on_event(&UploadEvent::DeviceLine(line.clone()));
        if line == token::OK {
            debug!("Header accepted");
            return Ok(());
        }
        lines.push(line);
    }

    Err(Error::HandshakeTimedOut { window, lines })
}
