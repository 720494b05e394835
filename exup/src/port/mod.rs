//! Port abstraction for serial communication.
//!
//! The upload protocol talks to the device through the [`Port`] trait:
//!
//! ```text
//! +----------------------------------------+
//! |  Session (handshake, transfer, drains) |
//! +-------------------+--------------------+
//!                     |
//!                     v
//! +-------------------+--------------------+
//! |               Port trait               |
//! +---------+--------------------+---------+
//!           |                    |
//!           v                    v
//! +---------+--------+  +--------+---------+
//! |    NativePort    |  |   ScriptedPort   |
//! |   (serialport)   |  | (virtual device) |
//! +------------------+  +------------------+
//! ```
//!
//! Reads are bounded by the port timeout. A read that times out is not an
//! error: [`Port::read_byte`] and [`Port::read_line`] return `None`. The
//! timeout bounds a whole line, not the gap between two of its bytes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use exup::port::Port;
//!
//! fn echo_lines<P: Port>(port: &mut P) -> exup::Result<()> {
//!     port.write_all_bytes(b"hello\n")?;
//!     while let Some(line) = port.read_line()? {
//!         println!("DEVICE> {line}");
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;
pub mod scripted;

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_BAUD;

/// Default read timeout; also the acknowledgment window per chunk.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest line [`Port::read_line`] collects before handing it back.
pub const MAX_LINE_LEN: usize = 1024;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM12").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name().to_string(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Platform default serial port name.
pub fn default_port_name() -> &'static str {
    if cfg!(windows) { "COM12" } else { "/dev/ttyUSB0" }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Byte-oriented, timeout-bounded, bidirectional channel to the device.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Discard bytes received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Number of received bytes that can be read without blocking.
    fn pending_count(&self) -> Result<usize>;

    /// Close the port and release resources.
    ///
    /// Closing an already closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(self, buf)?;
        Write::flush(self)?;
        Ok(())
    }

    /// Read a single byte, `None` if the timeout expired.
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Instant the read timeout is measured against.
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// Read one text line.
    ///
    /// Bytes are collected until `\n`, until [`MAX_LINE_LEN`] bytes arrived,
    /// or until one timeout has passed since the call started. Returns `None`
    /// if nothing arrived; otherwise the decoded, trimmed line (which may be
    /// empty).
    fn read_line(&mut self) -> Result<Option<String>> {
        let timeout = self.timeout();
        let deadline = self.now() + timeout;
        let mut raw = Vec::new();

        let collected = collect_line(self, deadline, &mut raw);
        let restored = if self.timeout() == timeout {
            Ok(())
        } else {
            self.set_timeout(timeout)
        };

        let got_line = collected?;
        restored?;
        Ok(got_line.then(|| decode_line(&raw)))
    }
}

/// Fill `raw` until newline, length cap or `deadline`.
///
/// Each read waits at most for the time left until `deadline`. Returns
/// whether anything arrived, a lone newline included.
fn collect_line<P: Port + ?Sized>(port: &mut P, deadline: Instant, raw: &mut Vec<u8>) -> Result<bool> {
    while raw.len() < MAX_LINE_LEN {
        let remaining = deadline.saturating_duration_since(port.now());
        if remaining.is_zero() {
            break;
        }
        if remaining != port.timeout() {
            port.set_timeout(remaining)?;
        }
        match port.read_byte()? {
            Some(b'\n') => return Ok(true),
            Some(b) => raw.push(b),
            None => break,
        }
    }
    Ok(!raw.is_empty())
}

/// Decode a raw device line.
///
/// Undecodable bytes and control characters are dropped and surrounding
/// whitespace is trimmed.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|&ch| ch != char::REPLACEMENT_CHARACTER && (ch == '\t' || !ch.is_control()))
        .collect::<String>()
        .trim()
        .to_string()
}

// Re-export the appropriate implementation based on features
#[cfg(feature = "native")]
pub use native::NativePort;
pub use scripted::{Reply, ScriptHandle, ScriptedPort};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_decode_line_trims_and_drops_garbage() {
        assert_eq!(decode_line(b"  OK\r"), "OK");
        assert_eq!(decode_line(b"\xFFJEDEC \x07EF4015\r"), "JEDEC EF4015");
        assert_eq!(decode_line(b"\r"), "");
    }

    #[test]
    fn test_decode_line_keeps_utf8() {
        assert_eq!(decode_line("sıcaklık=21\r".as_bytes()), "sıcaklık=21");
    }

    #[test]
    fn test_read_line_bounded_by_one_timeout() {
        let clock = ManualClock::new();
        let mut port = (0..50u64).fold(ScriptedPort::new(clock.clone()), |p, i| {
            p.emit_at(Duration::from_millis(i * 100), b"x")
        });

        let line = port.read_line().unwrap().unwrap();
        assert!(!line.is_empty() && line.chars().all(|c| c == 'x'), "{line:?}");
        assert!(clock.elapsed() <= DEFAULT_TIMEOUT);
        assert_eq!(port.timeout(), DEFAULT_TIMEOUT);

        port.read_line().unwrap().unwrap();
        assert!(clock.elapsed() <= DEFAULT_TIMEOUT * 2);
    }

    #[test]
    fn test_read_line_capped() {
        let clock = ManualClock::new();
        let mut port =
            ScriptedPort::new(clock.clone()).emit_at(Duration::ZERO, vec![b'y'; MAX_LINE_LEN + 10]);

        assert_eq!(port.read_line().unwrap().unwrap().len(), MAX_LINE_LEN);
        assert_eq!(port.read_line().unwrap().unwrap().len(), 10);
        assert_eq!(port.read_line().unwrap(), None);
    }

    #[test]
    fn test_read_line_empty_line_is_some() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock).emit_at(Duration::ZERO, b"\r\nOK\r\n");

        assert_eq!(port.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(port.read_line().unwrap().as_deref(), Some("OK"));
    }

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0", 57600).with_timeout(Duration::from_secs(1));

        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }
}
