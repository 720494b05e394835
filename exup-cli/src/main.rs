//! exup CLI - Command-line tool for uploading images to EXUP serial bootloaders.
//!
//! ## Features
//!
//! - Validates the Intel HEX image before touching the port
//! - Streams device log lines as `DEVICE> ...`
//! - Progress bar with average throughput
//! - Environment variable and config file support
//! - Distinct exit status per failure class

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use env_logger::Env;
use exup::{
    Image, SerialConfig, SessionOutcome, SessionState, UploadEvent, UploadObserver, UploadSession,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod config;

use config::Config;

const AFTER_HELP: &str = "\
Exit status:
  0  upload completed, device reported DONE
  1  image missing, empty, not Intel HEX or too large
  2  no OK from the device after the header
  3  a chunk was rejected or not acknowledged
  4  final status was not DONE
  5  serial port failure

Example:
  exup -p /dev/ttyUSB0 firmware.hex";

/// exup - Upload Intel HEX images to an EXUP serial bootloader.
#[derive(Parser)]
#[command(name = "exup")]
#[command(author, version, about, long_about = None)]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Intel HEX image to upload.
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Serial port to use (COM12 on Windows, /dev/ttyUSB0 elsewhere if unset).
    #[arg(short, long, env = "EXUP_PORT")]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, env = "EXUP_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress device output and progress).
    #[arg(short, long)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
}

/// Renders upload events on the terminal.
struct ConsoleObserver {
    pb: ProgressBar,
    fancy: bool,
    quiet: bool,
}

/// Whether the progress bar is drawn. Colour settings have no say here.
fn draws_progress(quiet: bool, stderr_is_tty: bool) -> bool {
    !quiet && stderr_is_tty
}

impl ConsoleObserver {
    fn new(quiet: bool, stderr_is_tty: bool) -> Self {
        let fancy = draws_progress(quiet, stderr_is_tty);
        let pb = if !fancy {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(0);
            #[allow(clippy::unwrap_used)] // Static template string
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                         {bytes}/{total_bytes} {msg}",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb
        };
        Self { pb, fancy, quiet }
    }

    fn device_line(&self, line: &str) {
        if self.quiet {
            return;
        }
        self.pb
            .suspend(|| println!("{} {line}", style("DEVICE>").cyan()));
    }
}

impl UploadObserver for ConsoleObserver {
    fn on_event(&self, event: &UploadEvent) {
        match event {
            UploadEvent::StateChanged { to, .. } => match to {
                SessionState::HandshakeSent if !self.quiet => {
                    self.pb
                        .suspend(|| eprintln!("{} Sending header", style("→").cyan()));
                },
                SessionState::Transferring => self.pb.set_message("uploading"),
                SessionState::AwaitingFinal => self.pb.set_message("waiting for DONE"),
                SessionState::Completed => self.pb.finish_with_message("done"),
                SessionState::Failed => self.pb.abandon(),
                _ => {},
            },
            UploadEvent::DeviceLine(line) => self.device_line(line),
            UploadEvent::ChunkRejected { .. } => self.device_line("NAK"),
            UploadEvent::NoAcknowledgment { offset, response } => {
                let response = response.map_or_else(|| "<timeout>".to_string(), |b| format!("0x{b:02X}"));
                self.pb.suspend(|| {
                    eprintln!(
                        "{} No ACK at {offset}, resp={response}",
                        style("!").yellow().bold()
                    );
                });
            },
            UploadEvent::ChunkAcked { .. } => {},
            UploadEvent::Progress { sent, total } => {
                self.pb.set_length(*total as u64);
                self.pb.set_position(*sent as u64);
            },
            UploadEvent::Throughput {
                sent,
                total,
                bytes_per_sec,
            } => {
                let rate = format!("{:.1} KiB/s", bytes_per_sec / 1024.0);
                if self.fancy {
                    self.pb.set_message(rate);
                } else if !self.quiet {
                    println!("Progress: {sent}/{total} ({rate})");
                }
            },
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "exup v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    let result = upload(&cli, &config, stderr_is_tty);
    let outcome = outcome_of(&result);
    debug!("Outcome: {outcome:?}");

    match &result {
        Ok(()) => {
            if !cli.quiet {
                eprintln!(
                    "{} Upload complete, device reported DONE",
                    style("✓").green().bold()
                );
            }
        },
        Err(e) => eprintln!("{} {e:#}", style("Error:").red().bold()),
    }

    ExitCode::from(outcome.exit_code())
}

/// Validate the image, then run one upload session.
fn upload(cli: &Cli, config: &Config, stderr_is_tty: bool) -> Result<()> {
    let image = Image::from_file(&cli.image)
        .with_context(|| format!("Rejected image {}", cli.image.display()))?;

    let port = cli
        .port
        .clone()
        .unwrap_or_else(|| config.port_or_default());
    let baud = cli
        .baud
        .unwrap_or_else(|| config.baud_or_default());

    if !cli.quiet {
        eprintln!(
            "{} {} bytes, {} chunks, fnv1a 0x{:08X}",
            style("Image:").bold(),
            image.size(),
            image.chunk_count(),
            image.checksum()
        );
        eprintln!("{} Opening {port} @ {baud}", style("⏳").yellow());
    }

    let serial = SerialConfig::new(&port, baud);
    let observer = Arc::new(ConsoleObserver::new(cli.quiet, stderr_is_tty));
    let session = UploadSession::open(&serial)
        .with_context(|| format!("Failed to open {port}"))?
        .with_observer(observer);

    session.run(&image)?;
    Ok(())
}

/// Map a run result onto its outcome; errors without a library cause are transport faults.
fn outcome_of(result: &Result<()>) -> SessionOutcome {
    match result {
        Ok(()) => SessionOutcome::Success,
        Err(e) => e
            .downcast_ref::<exup::Error>()
            .map_or(SessionOutcome::TransportFailed, SessionOutcome::from),
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_image_only() {
        let cli = Cli::try_parse_from(["exup", "firmware.hex"]).unwrap();
        assert_eq!(cli.image, PathBuf::from("firmware.hex"));
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config_path.is_none());
    }

    #[test]
    fn test_cli_parse_all_options() {
        let cli = Cli::try_parse_from([
            "exup",
            "-p",
            "COM3",
            "--baud",
            "57600",
            "-vv",
            "--quiet",
            "--config",
            "/tmp/exup.toml",
            "image.hex",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud, Some(57600));
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/exup.toml")));
        assert_eq!(cli.image, PathBuf::from("image.hex"));
    }

    #[test]
    fn test_cli_missing_image() {
        assert!(Cli::try_parse_from(["exup"]).is_err());
    }

    #[test]
    fn test_cli_invalid_baud() {
        assert!(Cli::try_parse_from(["exup", "--baud", "fast", "image.hex"]).is_err());
    }

    #[test]
    fn test_progress_ignores_colour_setting() {
        console::set_colors_enabled_stderr(false);
        assert!(draws_progress(false, true));
        assert!(ConsoleObserver::new(false, true).fancy);

        assert!(!draws_progress(true, true));
        assert!(!draws_progress(false, false));
        assert!(!ConsoleObserver::new(false, false).fancy);
    }

    #[test]
    fn test_outcome_survives_context() {
        let result: Result<()> = Err(exup::Error::EmptyInput).context("Rejected image empty.hex");
        assert_eq!(outcome_of(&result), SessionOutcome::InputRejected);

        let result: Result<()> = Err(exup::Error::FinalNotDone {
            last_line: Some("ERR".into()),
        }
        .into());
        assert_eq!(outcome_of(&result).exit_code(), 4);
    }

    #[test]
    fn test_outcome_of_foreign_error() {
        let result: Result<()> = Err(anyhow::anyhow!("something else"));
        assert_eq!(outcome_of(&result), SessionOutcome::TransportFailed);
        assert_eq!(outcome_of(&Ok(())), SessionOutcome::Success);
    }
}
