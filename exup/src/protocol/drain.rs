//! Draining device text output.
//!
//! The device prints boot banners and diagnostics on the same stream as
//! protocol bytes. These helpers consume such lines at points where no
//! protocol byte is expected and surface each non-empty one to the observer.

use crate::clock::Clock;
use crate::error::Result;
use crate::events::{UploadEvent, UploadObserver};
use crate::port::Port;
use log::trace;
use std::time::Duration;

/// Lines drained after each chunk reply.
pub const QUIET_DRAIN_LINES: usize = 3;

/// Diagnostic lines read after a NAK.
pub const NAK_DRAIN_LINES: usize = 4;

fn surface(line: String, observer: &dyn UploadObserver, lines: &mut Vec<String>) {
    observer.on_event(&UploadEvent::DeviceLine(line.clone()));
    lines.push(line);
}

/// Read lines until one comes back empty or `duration` elapses.
///
/// A line that is present but blank ends the drain just like a timeout.
pub fn drain_for<P: Port + ?Sized>(
    port: &mut P,
    clock: &dyn Clock,
    duration: Duration,
    observer: &dyn UploadObserver,
) -> Result<Vec<String>> {
    let start = clock.now();
    let mut lines = Vec::new();

    while clock
        .now()
        .saturating_duration_since(start)
        < duration
    {
        match port.read_line()? {
            Some(line) if !line.is_empty() => surface(line, observer, &mut lines),
            _ => break,
        }
    }

    trace!("Startup drain consumed {} lines", lines.len());
    Ok(lines)
}

/// Read at most `max_lines` lines, only while input is already pending.
///
/// Never waits for data that has not arrived yet, so a reply the device
/// sends later is left for the next reader.
pub fn drain_pending<P: Port + ?Sized>(
    port: &mut P,
    max_lines: usize,
    observer: &dyn UploadObserver,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    for _ in 0..max_lines {
        if port.pending_count()? == 0 {
            break;
        }
        if let Some(line) = port.read_line()? {
            if !line.is_empty() {
                surface(line, observer, &mut lines);
            }
        }
    }

    Ok(lines)
}

/// Read at most `max_lines` lines, stopping at the first empty or absent one.
pub fn drain_lines<P: Port + ?Sized>(
    port: &mut P,
    max_lines: usize,
    observer: &dyn UploadObserver,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    for _ in 0..max_lines {
        match port.read_line()? {
            Some(line) if !line.is_empty() => surface(line, observer, &mut lines),
            _ => break,
        }
    }

    Ok(lines)
}
