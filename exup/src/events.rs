//! Upload events for UI decoupling.
//!
//! The session reports what it sees through an [`UploadObserver`]. Observers
//! only watch; nothing they do feeds back into protocol decisions.

use std::fmt;

/// Upload session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// Nothing opened yet.
    Idle,
    /// Port open, stale input discarded.
    PortOpened,
    /// Surfacing boot-time device output.
    Draining,
    /// Header written, waiting for `OK`.
    HandshakeSent,
    /// Device accepted the header.
    HandshakeAcked,
    /// Sending chunks.
    Transferring,
    /// All chunks acknowledged, waiting for `DONE`.
    AwaitingFinal,
    /// Device reported `DONE`.
    Completed,
    /// The attempt failed.
    Failed,
}

impl SessionState {
    /// Whether the session has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::PortOpened => "PortOpened",
            Self::Draining => "Draining",
            Self::HandshakeSent => "HandshakeSent",
            Self::HandshakeAcked => "HandshakeAcked",
            Self::Transferring => "Transferring",
            Self::AwaitingFinal => "AwaitingFinal",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Events emitted during an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Session state changed.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// A non-empty text line from the device.
    DeviceLine(String),
    /// The device acknowledged a chunk.
    ChunkAcked {
        /// Chunk offset.
        offset: usize,
    },
    /// The device rejected a chunk.
    ChunkRejected {
        /// Chunk offset.
        offset: usize,
    },
    /// Chunk answered with an unexpected byte or not at all.
    NoAcknowledgment {
        /// Chunk offset.
        offset: usize,
        /// Raw response, `None` on timeout.
        response: Option<u8>,
    },
    /// Bytes acknowledged so far.
    Progress {
        /// Acknowledged bytes.
        sent: usize,
        /// Image size.
        total: usize,
    },
    /// Periodic transfer rate report.
    Throughput {
        /// Acknowledged bytes.
        sent: usize,
        /// Image size.
        total: usize,
        /// Average rate since the first chunk.
        bytes_per_sec: f64,
    },
}

/// Observer trait for receiving upload events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait UploadObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &UploadEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UploadObserver for NullObserver {
    fn on_event(&self, _event: &UploadEvent) {}
}

/// Observer that forwards events to the `log` facade.
pub struct LogObserver;

impl UploadObserver for LogObserver {
    fn on_event(&self, event: &UploadEvent) {
        match event {
            UploadEvent::StateChanged { from, to } => log::debug!("State {from} -> {to}"),
            UploadEvent::DeviceLine(line) => log::info!("DEVICE> {line}"),
            UploadEvent::ChunkAcked { offset } => log::trace!("ACK at {offset}"),
            UploadEvent::ChunkRejected { offset } => log::warn!("NAK at {offset}"),
            UploadEvent::NoAcknowledgment { offset, response } => match response {
                Some(b) => log::warn!("No ACK at {offset}, resp=0x{b:02X}"),
                None => log::warn!("No ACK at {offset}, resp=<timeout>"),
            },
            UploadEvent::Progress { .. } => {},
            UploadEvent::Throughput {
                sent,
                total,
                bytes_per_sec,
            } => log::info!("Progress: {sent}/{total} ({:.1} KiB/s)", bytes_per_sec / 1024.0),
        }
    }
}

impl<T: UploadObserver + ?Sized> UploadObserver for &T {
    fn on_event(&self, event: &UploadEvent) {
        (**self).on_event(event);
    }
}

impl<T: UploadObserver + ?Sized> UploadObserver for std::sync::Arc<T> {
    fn on_event(&self, event: &UploadEvent) {
        (**self).on_event(event);
    }
}

/// Observer that records every event, for tests and post-mortem reports.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<UploadEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<UploadEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Device lines recorded so far.
    pub fn device_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UploadEvent::DeviceLine(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<SessionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UploadEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl UploadObserver for RecordingObserver {
    fn on_event(&self, event: &UploadEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_filters() {
        let recorder = RecordingObserver::new();
        recorder.on_event(&UploadEvent::StateChanged {
            from: SessionState::Idle,
            to: SessionState::PortOpened,
        });
        recorder.on_event(&UploadEvent::DeviceLine("READY".into()));

        assert_eq!(recorder.device_lines(), vec!["READY".to_string()]);
        assert_eq!(recorder.states(), vec![SessionState::PortOpened]);
        assert_eq!(recorder.events().len(), 2);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::AwaitingFinal.is_terminal());
    }
}
