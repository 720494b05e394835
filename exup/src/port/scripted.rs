//! Scripted port that replays device behaviour on virtual time.
//!
//! Each write to the port consumes the next queued [`Reply`]; the reply's
//! bytes become readable after their delays, measured from the write. Reads
//! with nothing ready advance the shared [`ManualClock`] either to the next
//! scheduled byte or by the full read timeout, just like a real port
//! blocking in `read()`.
//!
//! ```rust
//! use exup::clock::ManualClock;
//! use exup::port::{Port, Reply, ScriptedPort};
//!
//! let clock = ManualClock::new();
//! let mut port = ScriptedPort::new(clock.clone()).reply(Reply::line("OK"));
//! let handle = port.handle();
//!
//! port.write_all_bytes(b"EXUP").unwrap();
//! assert_eq!(port.read_line().unwrap().as_deref(), Some("OK"));
//! assert_eq!(port.read_line().unwrap(), None);
//! assert_eq!(handle.writes().len(), 1);
//! ```

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;

use crate::clock::{Clock, ManualClock};
use crate::error::{Error, Result};
use crate::port::{DEFAULT_TIMEOUT, Port};
use crate::protocol::{DEFAULT_BAUD, control};

/// Device response to one host write.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    segments: Vec<(Duration, Vec<u8>)>,
    fail: bool,
}

impl Reply {
    /// An empty reply (the device stays silent).
    pub fn silent() -> Self {
        Self::default()
    }

    /// Reply with raw bytes, readable right after the write.
    pub fn bytes(data: impl AsRef<[u8]>) -> Self {
        Self::silent().then(data)
    }

    /// Reply with a `\r\n` terminated text line.
    pub fn line(text: &str) -> Self {
        Self::silent().then_line(text)
    }

    /// Fail the write that consumes this reply, as if the device vanished.
    pub fn fail() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Reply with a single ACK byte.
    pub fn ack() -> Self {
        Self::bytes([control::ACK])
    }

    /// Reply with a single NAK byte.
    pub fn nak() -> Self {
        Self::bytes([control::NAK])
    }

    /// Append bytes readable right after the write.
    #[must_use]
    pub fn then(self, data: impl AsRef<[u8]>) -> Self {
        self.after(Duration::ZERO, data)
    }

    /// Append a text line readable right after the write.
    #[must_use]
    pub fn then_line(self, text: &str) -> Self {
        self.then(format!("{text}\r\n"))
    }

    /// Append bytes readable `delay` after the write.
    #[must_use]
    pub fn after(mut self, delay: Duration, data: impl AsRef<[u8]>) -> Self {
        self.segments
            .push((delay, data.as_ref().to_vec()));
        self
    }

    /// Append a text line readable `delay` after the write.
    #[must_use]
    pub fn after_line(self, delay: Duration, text: &str) -> Self {
        self.after(delay, format!("{text}\r\n"))
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    inbound: VecDeque<(Instant, u8)>,
    replies: VecDeque<Reply>,
    writes: Vec<Vec<u8>>,
    disconnect_at: Option<Instant>,
    clear_count: usize,
    close_count: usize,
    closed: bool,
}

impl ScriptState {
    fn schedule(&mut self, at: Instant, data: &[u8]) {
        self.inbound
            .extend(data.iter().map(|&b| (at, b)));
        self.inbound
            .make_contiguous()
            .sort_by_key(|&(t, _)| t);
    }

    fn ready_count(&self, now: Instant) -> usize {
        self.inbound
            .iter()
            .take_while(|&&(t, _)| t <= now)
            .count()
    }
}

/// Inspection handle for a [`ScriptedPort`], usable after the port moved.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// All writes, one entry per write call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .clone()
    }

    /// Number of times the input buffer was cleared.
    pub fn clear_count(&self) -> usize {
        self.lock().clear_count
    }

    /// Number of close calls.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Whether the port has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Replies not yet consumed by a write.
    pub fn remaining_replies(&self) -> usize {
        self.lock()
            .replies
            .len()
    }
}

/// In-memory [`Port`] driven by a script of device replies.
#[derive(Debug)]
pub struct ScriptedPort {
    state: Arc<Mutex<ScriptState>>,
    clock: ManualClock,
    name: String,
    timeout: Duration,
}

impl ScriptedPort {
    /// Create a port on the given virtual clock.
    pub fn new(clock: ManualClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            clock,
            name: "scripted".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Queue the reply to the next unanswered write.
    #[must_use]
    pub fn reply(self, reply: Reply) -> Self {
        self.lock()
            .replies
            .push_back(reply);
        self
    }

    /// Queue several replies in order.
    #[must_use]
    pub fn replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.lock()
            .replies
            .extend(replies);
        self
    }

    /// Emit unsolicited bytes at `offset` from the clock's origin.
    #[must_use]
    pub fn emit_at(self, offset: Duration, data: impl AsRef<[u8]>) -> Self {
        let at = self.clock.at(offset);
        self.lock()
            .schedule(at, data.as_ref());
        self
    }

    /// Emit an unsolicited text line at `offset` from the clock's origin.
    #[must_use]
    pub fn emit_line_at(self, offset: Duration, text: &str) -> Self {
        self.emit_at(offset, format!("{text}\r\n"))
    }

    /// Fail every read from `offset` after the clock's origin on.
    #[must_use]
    pub fn disconnect_at(self, offset: Duration) -> Self {
        let at = self.clock.at(offset);
        self.lock().disconnect_at = Some(at);
        self
    }

    /// Get an inspection handle.
    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Port for ScriptedPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn baud_rate(&self) -> u32 {
        DEFAULT_BAUD
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_input(&mut self) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.closed {
            return Err(Error::PortClosed);
        }
        let ready = state.ready_count(now);
        state
            .inbound
            .drain(..ready);
        state.clear_count += 1;
        Ok(())
    }

    fn pending_count(&self) -> Result<usize> {
        let state = self.lock();
        if state.closed {
            return Err(Error::PortClosed);
        }
        Ok(state.ready_count(self.clock.now()))
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.closed = true;
        state.close_count += 1;
        Ok(())
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        if state
            .disconnect_at
            .is_some_and(|at| at <= now)
        {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }
        if state.ready_count(now) == 0 {
            match state.inbound.front() {
                Some(&(at, _)) if at <= now + self.timeout => self.clock.advance(at - now),
                _ => {
                    self.clock.advance(self.timeout);
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                },
            }
        }

        let now = self.clock.now();
        let mut n = 0;
        while n < buf.len() {
            match state.inbound.front() {
                Some(&(at, b)) if at <= now => {
                    buf[n] = b;
                    state.inbound.pop_front();
                    n += 1;
                },
                _ => break,
            }
        }
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = self.clock.now();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }

        let reply = state.replies.pop_front();
        if reply.as_ref().is_some_and(|r| r.fail) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }

        trace!("Scripted port received {} bytes", buf.len());
        state.writes.push(buf.to_vec());
        if let Some(reply) = reply {
            for (delay, data) in reply.segments {
                state.schedule(now + delay, &data);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
