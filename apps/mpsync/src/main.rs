//! mpsync entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mpsync_engine::{SyncConfig, SyncDriver, SyncError};
use mpsync_transport::{SerialSettings, SerialTransport, TransportError};

/// Upload files and directories onto a MicroPython device.
#[derive(Debug, Parser)]
#[command(name = "mpsync", version, about)]
struct Cli {
    /// Serial device, e.g. /dev/ttyUSB0.
    device: String,

    /// File or directory to upload.
    path: PathBuf,

    /// Local path to exclude; may be repeated.
    #[arg(short = 'X', long = "exclude", value_name = "PATH")]
    exclude: Vec<PathBuf>,

    /// Change the working directory before resolving paths.
    #[arg(short = 'C', long = "chdir", value_name = "PATH")]
    chdir: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Only upload files that differ from the device copy.
    #[arg(short, long)]
    different: bool,

    /// Serial baud rate.
    #[arg(long, default_value_t = mpsync_transport::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Settle delay after opening the port, in milliseconds.
    #[arg(long = "settle-ms", value_name = "MS", default_value_t = 500)]
    settle_ms: u64,

    /// Read size for the on-device hash loop.
    #[arg(long, value_name = "BYTES", default_value_t = mpsync_transport::DEFAULT_HASH_CHUNK_SIZE)]
    hash_chunk_size: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize structured logging.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mpsync");

    if let Some(dir) = &cli.chdir {
        if let Err(e) = std::env::set_current_dir(dir) {
            eprintln!("cannot change directory to {}: {e}", dir.display());
            return ExitCode::FAILURE;
        }
    }

    let settings = SerialSettings {
        baud_rate: cli.baud,
        settle_delay: Duration::from_millis(cli.settle_ms),
        hash_chunk_size: cli.hash_chunk_size,
        ..Default::default()
    };

    eprintln!("Connecting to {}", cli.device);
    let mut transport = match SerialTransport::connect(&cli.device, settings) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("cannot connect to {}: {e}", cli.device);
            eprintln!("hint: {}", connect_remedy(&e));
            return ExitCode::FAILURE;
        }
    };

    let config = SyncConfig {
        only_different: cli.different,
        ..Default::default()
    };

    let started = Instant::now();
    let mut driver = SyncDriver::new(&mut transport, config);
    match driver.run(&cli.path, &cli.exclude) {
        Ok(report) => {
            // Individual failures do not fail the batch; report them
            // and exit clean.
            if !report.is_clean() {
                eprintln!("{} of {} files failed:", report.failed.len(), report.total);
                for failure in &report.failed {
                    eprintln!("  {}: {}", failure.rel_path, failure.error);
                }
            }
            eprintln!("Soft reboot");
            eprintln!("--- {:.2} seconds ---", started.elapsed().as_secs_f64());
            ExitCode::SUCCESS
        }
        Err(SyncError::ConnectionLost {
            attempted,
            total,
            not_attempted,
        }) => {
            for path in &not_attempted {
                eprintln!("not attempted: {path}");
            }
            eprintln!("upload aborted: connection lost after {attempted} of {total} files");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("upload failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// The likely remedy for a connect-time failure.
fn connect_remedy(error: &TransportError) -> &'static str {
    match error {
        TransportError::DeviceBusy(_) => {
            "close any open serial monitor or REPL session, then retry"
        }
        TransportError::PermissionDenied(_) => {
            "check the port permissions (on Linux, add yourself to the dialout group)"
        }
        TransportError::DeviceAbsent(_) => {
            "check the cable and the device path, then retry after a reset"
        }
        _ => "retry after resetting the device",
    }
}
