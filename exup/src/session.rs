//! Upload session state machine.
//!
//! ```text
//! Idle -> PortOpened -> Draining -> HandshakeSent -> HandshakeAcked
//!      -> Transferring -> AwaitingFinal -> Completed
//!                  \_____________\_____________\____> Failed
//! ```
//!
//! A session makes exactly one attempt. It owns the port and closes it
//! before [`UploadSession::run`] returns, and again on drop if a panic
//! unwinds through it.

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, ErrorClass, Result};
use crate::events::{LogObserver, SessionState, UploadEvent, UploadObserver};
use crate::image::Image;
use crate::port::Port;
use crate::protocol::drain::drain_for;
use crate::protocol::handshake::{HANDSHAKE_WINDOW, negotiate};
use crate::protocol::token;
use crate::protocol::transfer::{ChunkTransmitter, TransferConfig};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Session timing and drain limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait after opening the port, for the device to reset and boot.
    pub settle_delay: Duration,
    /// Upper bound on the startup drain.
    pub startup_drain: Duration,
    /// Window for the `OK` reply to the header.
    pub handshake_window: Duration,
    /// Window for the final status line.
    pub final_window: Duration,
    /// Per-chunk drain limits and reporting.
    pub transfer: TransferConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
            startup_drain: Duration::from_secs(2),
            handshake_window: HANDSHAKE_WINDOW,
            final_window: Duration::from_secs(5),
            transfer: TransferConfig::default(),
        }
    }
}

/// How an upload attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionOutcome {
    /// Device reported `DONE`.
    Success,
    /// The image was unreadable, empty, not Intel HEX or too large.
    InputRejected,
    /// No `OK` within the handshake window.
    HandshakeTimedOut,
    /// A chunk was answered with NAK.
    ChunkRejected,
    /// A chunk was answered with something else, or not at all.
    NoAcknowledgment,
    /// The final line was not `DONE`.
    FinalNotDone,
    /// The port could not be opened or failed mid-session.
    TransportFailed,
}

impl SessionOutcome {
    /// Classify the result of a session.
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => Self::from(e),
        }
    }

    /// Process exit status for this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::InputRejected => 1,
            Self::HandshakeTimedOut => 2,
            Self::ChunkRejected | Self::NoAcknowledgment => 3,
            Self::FinalNotDone => 4,
            Self::TransportFailed => 5,
        }
    }

    /// Whether the upload succeeded.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<&Error> for SessionOutcome {
    fn from(err: &Error) -> Self {
        match err {
            Error::HandshakeTimedOut { .. } => Self::HandshakeTimedOut,
            Error::ChunkRejected { .. } => Self::ChunkRejected,
            Error::NoAcknowledgment { .. } => Self::NoAcknowledgment,
            Error::FinalNotDone { .. } => Self::FinalNotDone,
            other => match other.class() {
                ErrorClass::Input => Self::InputRejected,
                ErrorClass::Transport | ErrorClass::Protocol => Self::TransportFailed,
            },
        }
    }
}

/// One upload attempt over an open port.
pub struct UploadSession<P: Port> {
    port: P,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn UploadObserver>,
    config: SessionConfig,
    state: SessionState,
}

impl<P: Port> UploadSession<P> {
    /// Create a session on an already opened port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            clock: Arc::new(SystemClock),
            observer: Arc::new(LogObserver),
            config: SessionConfig::default(),
            state: SessionState::Idle,
        }
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report events to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override timing and drain limits.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Upload `image` and close the port.
    ///
    /// Stops at the first failure; nothing is retried.
    pub fn run(mut self, image: &Image) -> Result<()> {
        info!(
            "Uploading {} bytes (fnv1a 0x{:08X}) via {}",
            image.size(),
            image.checksum(),
            self.port.name()
        );

        let result = self.drive(image);
        match &result {
            Ok(()) => {
                info!("Upload complete");
                self.transition(SessionState::Completed);
            },
            Err(e) => {
                debug!("Upload failed: {e}");
                self.transition(SessionState::Failed);
            },
        }

        let closed = self.port.close();
        result?;
        closed
    }

    fn drive(&mut self, image: &Image) -> Result<()> {
        debug!("Waiting {:?} for the device to settle", self.config.settle_delay);
        self.clock
            .sleep(self.config.settle_delay);
        self.port.clear_input()?;
        self.transition(SessionState::PortOpened);

        self.transition(SessionState::Draining);
        drain_for(
            &mut self.port,
            &*self.clock,
            self.config.startup_drain,
            &*self.observer,
        )?;

        self.transition(SessionState::HandshakeSent);
        negotiate(
            &mut self.port,
            &*self.clock,
            &image.header(),
            self.config.handshake_window,
            &*self.observer,
        )?;
        self.transition(SessionState::HandshakeAcked);

        self.transition(SessionState::Transferring);
        ChunkTransmitter::with_config(
            &mut self.port,
            &*self.clock,
            &*self.observer,
            self.config.transfer.clone(),
        )
        .send_all(image)?;

        self.transition(SessionState::AwaitingFinal);
        self.await_final()
    }

    /// Wait for `DONE` or `ERR`, keeping the last non-empty line seen.
    fn await_final(&mut self) -> Result<()> {
        let start = self.clock.now();
        let mut last_line: Option<String> = None;

        while self
            .clock
            .now()
            .saturating_duration_since(start)
            < self.config.final_window
        {
            let Some(line) = self.port.read_line()? else {
                continue;
            };
            if line.is_empty() {
                continue;
            }

            self.observer
                .on_event(&UploadEvent::DeviceLine(line.clone()));
            let terminal = line == token::DONE || line == token::ERR;
            last_line = Some(line);
            if terminal {
                break;
            }
        }

        if last_line.as_deref() == Some(token::DONE) {
            Ok(())
        } else {
            Err(Error::FinalNotDone { last_line })
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        debug!("Session {from} -> {to}");
        self.state = to;
        self.observer
            .on_event(&UploadEvent::StateChanged { from, to });
    }
}

#[cfg(feature = "native")]
impl UploadSession<crate::port::NativePort> {
    /// Open the serial port described by `config` and start a session on it.
    pub fn open(config: &crate::port::SerialConfig) -> Result<Self> {
        let port = crate::port::NativePort::open(config)?;
        Ok(Self::new(port))
    }
}

impl<P: Port> Drop for UploadSession<P> {
    fn drop(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Failed to close {}: {e}", self.port.name());
        }
    }
}
