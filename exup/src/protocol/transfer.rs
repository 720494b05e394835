//! Chunked image transfer.
//!
//! ```text
//! +--------------------+        +-------+
//! | chunk (<=256 bytes)| -----> |       |
//! +--------------------+        |device |
//!         ACK  <--------------- |       |   drain pending lines unless last, next chunk
//!         NAK  <--------------- |       |   read diagnostics, stop
//!   other/none <--------------- |       |   drain pending lines, stop
//!                               +-------+
//! ```
//!
//! There are no retries: the first chunk that is not acknowledged ends the
//! transfer and nothing after it is sent.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{UploadEvent, UploadObserver};
use crate::image::Image;
use crate::port::Port;
use crate::protocol::control;
use crate::protocol::drain::{NAK_DRAIN_LINES, QUIET_DRAIN_LINES, drain_lines, drain_pending};
use log::{debug, trace, warn};

/// Throughput is reported every this many chunks.
pub const PROGRESS_INTERVAL: usize = 64;

/// Transfer tuning.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Lines drained after an ACK or a missing acknowledgment.
    pub quiet_drain_lines: usize,
    /// Diagnostic lines read after a NAK.
    pub nak_drain_lines: usize,
    /// Chunks between throughput reports.
    pub progress_interval: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            quiet_drain_lines: QUIET_DRAIN_LINES,
            nak_drain_lines: NAK_DRAIN_LINES,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

/// Sends an image chunk by chunk, one acknowledgment per chunk.
pub struct ChunkTransmitter<'a, P: Port + ?Sized> {
    port: &'a mut P,
    clock: &'a dyn Clock,
    observer: &'a dyn UploadObserver,
    config: TransferConfig,
}

impl<'a, P: Port + ?Sized> ChunkTransmitter<'a, P> {
    /// Create a transmitter with default configuration.
    pub fn new(port: &'a mut P, clock: &'a dyn Clock, observer: &'a dyn UploadObserver) -> Self {
        Self::with_config(port, clock, observer, TransferConfig::default())
    }

    /// Create a transmitter with custom configuration.
    pub fn with_config(
        port: &'a mut P,
        clock: &'a dyn Clock,
        observer: &'a dyn UploadObserver,
        config: TransferConfig,
    ) -> Self {
        Self {
            port,
            clock,
            observer,
            config,
        }
    }

    /// Send every chunk of `image` in order.
    ///
    /// Returns once all chunks are acknowledged, or with the first
    /// rejection or missing acknowledgment.
    pub fn send_all(&mut self, image: &Image) -> Result<()> {
        let total = image.size();
        let interval = self
            .config
            .progress_interval
            .max(1);
        let chunk_count = image.chunk_count();
        let start = self.clock.now();
        let mut sent = 0;

        debug!("Sending {chunk_count} chunks ({total} bytes)");

        for chunk in image.chunks() {
            self.port
                .write_all_bytes(chunk.data)?;

            match self.port.read_byte()? {
                Some(control::ACK) => {
                    trace!("ACK at {}", chunk.offset);
                    self.observer
                        .on_event(&UploadEvent::ChunkAcked {
                            offset: chunk.offset,
                        });
                    // The final status line may already be queued behind the last ACK.
                    if chunk.index + 1 < chunk_count {
                        drain_pending(&mut *self.port, self.config.quiet_drain_lines, self.observer)?;
                    }
                },
                Some(control::NAK) => {
                    warn!("Chunk at offset {} rejected", chunk.offset);
                    self.observer
                        .on_event(&UploadEvent::ChunkRejected {
                            offset: chunk.offset,
                        });
                    let diagnostics =
                        drain_lines(&mut *self.port, self.config.nak_drain_lines, self.observer)?;
                    return Err(Error::ChunkRejected {
                        offset: chunk.offset,
                        diagnostics,
                    });
                },
                response => {
                    self.observer
                        .on_event(&UploadEvent::NoAcknowledgment {
                            offset: chunk.offset,
                            response,
                        });
                    drain_pending(&mut *self.port, self.config.quiet_drain_lines, self.observer)?;
                    return Err(Error::NoAcknowledgment {
                        offset: chunk.offset,
                        response,
                    });
                },
            }

            sent += chunk.data.len();
            self.observer
                .on_event(&UploadEvent::Progress { sent, total });

            if chunk.index % interval == 0 {
                let elapsed = self
                    .clock
                    .now()
                    .saturating_duration_since(start)
                    .as_secs_f64();
                #[allow(clippy::cast_precision_loss)]
                let bytes_per_sec = if elapsed > 0.0 {
                    sent as f64 / elapsed
                } else {
                    0.0
                };
                self.observer
                    .on_event(&UploadEvent::Throughput {
                        sent,
                        total,
                        bytes_per_sec,
                    });
            }
        }

        debug!("All {} bytes acknowledged", total);
        Ok(())
    }
}
