//! # Atorch Logger
//!
//! Log Atorch DC power-meter telemetry over serial to SQLite with CSV export.
//!
//! This binary connects to the meter, streams and decodes its binary report
//! frames, persists every reading durably, and writes the full history as
//! CSV on shutdown.
//!
//! ## Usage
//!
//! ```text
//! atorch-logger [CONFIG_PATH] [--clear] [--command NAME]
//! ```
//!
//! * `CONFIG_PATH` - TOML configuration file (default `config/default.toml`;
//!   built-in defaults when the file does not exist)
//! * `--clear` - delete the entire reading history and exit without
//!   connecting; passing the flag is the explicit confirmation
//! * `--command NAME` - queue one control command to the meter after
//!   connecting (`reset-energy`, `reset-capacity`, `reset-duration`,
//!   `reset-all`, `setup`, `enter`, `plus`, `minus`)

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::broadcast;
use tracing::{debug, info};

use atorch_logger::atorch::protocol::Command;
use atorch_logger::config::Config;
use atorch_logger::export::export_csv;
use atorch_logger::session::DeviceSession;
use atorch_logger::store::ReadingStore;
use atorch_logger::transport::TokioMeterPort;

/// Parsed command-line arguments
#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    config_path: String,
    clear: bool,
    command: Option<Command>,
}

/// Parse command-line arguments (everything after the program name)
fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = "config/default.toml".to_string();
    let mut clear = false;
    let mut command = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--clear" => clear = true,
            "--command" => {
                let Some(name) = args.next() else {
                    bail!("--command requires a command name");
                };
                match Command::from_name(&name) {
                    Some(parsed) => command = Some(parsed),
                    None => bail!(
                        "Unknown command name: {} (expected reset-energy, reset-capacity, \
                         reset-duration, reset-all, setup, enter, plus or minus)",
                        name
                    ),
                }
            }
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            path => config_path = path.to_string(),
        }
    }

    Ok(CliArgs {
        config_path,
        clear,
        command,
    })
}

/// Main entry point for the Atorch Logger application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Parse command-line arguments and load configuration
///    - Open the reading store, creating the schema on first use
///    - With `--clear`: delete the history and exit
///    - Open the serial connection to the meter
///
/// 2. **Streaming**
///    - The session decodes, stores, and broadcasts readings
///    - With `--command`: queue the requested control command once connected
///    - A status line is logged every N readings
///    - Runs until the device disconnects or Ctrl+C arrives
///
/// 3. **Shutdown**
///    - Disconnect the session
///    - Log session totals
///    - Write the full history as CSV if configured
///
/// # Errors
///
/// Returns error if:
/// - The arguments or configuration file cannot be parsed
/// - The store cannot be opened
/// - No meter device is found
/// - The shutdown export fails
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Atorch Logger v{} starting...", env!("CARGO_PKG_VERSION"));

    let cli = parse_args(std::env::args().skip(1))?;
    let config = if Path::new(&cli.config_path).exists() {
        Config::load(&cli.config_path)?
    } else {
        info!("No config file at {}, using defaults", cli.config_path);
        Config::default()
    };

    let store = Arc::new(ReadingStore::open(&config.database.url).await?);

    if cli.clear {
        store.clear().await?;
        info!("Reading history cleared");
        return Ok(());
    }

    let paths: Vec<&str> = config.serial.ports.iter().map(String::as_str).collect();
    let port = TokioMeterPort::open_with_paths(&paths, config.serial.baud_rate)?;
    info!("Meter port opened at: {}", port.device_path());

    let session = DeviceSession::connect(Box::new(port), Arc::clone(&store));
    let mut readings = session.subscribe_readings();
    let mut state = session.subscribe_state();

    if let Some(command) = cli.command {
        session.send_command(command).await?;
        info!("Queued {:?} command", command);
    }

    info!("Streaming; press Ctrl+C to exit");

    let mut reading_count: u64 = 0;

    // Main loop: display readings until disconnect or Ctrl+C
    loop {
        tokio::select! {
            reading = readings.recv() => match reading {
                Ok(reading) => {
                    reading_count += 1;
                    if reading_count % config.log.status_interval == 0 {
                        info!(
                            "{} readings logged (latest: {} mV, {} mA, {} W, {} Wh)",
                            reading_count,
                            reading.voltage_mv,
                            reading.current_ma,
                            reading.power_w,
                            reading.energy_wh,
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Display fell behind by {} readings", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            changed = state.changed() => {
                if changed.is_err() || !*state.borrow() {
                    info!("Meter disconnected");
                    break;
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                session.disconnect().await;
                break;
            }
        }
    }

    let stats = session.stats();
    info!(
        "Session totals: {} frames decoded, {} decode failures, {} bytes discarded",
        stats.frames_decoded, stats.decode_failures, stats.bytes_discarded
    );

    if config.export.export_on_shutdown {
        let text = export_csv(&store).await?;
        std::fs::write(&config.export.output_path, &text)?;
        info!(
            "Exported {} readings to {}",
            text.lines().count().saturating_sub(1),
            config.export.output_path
        );
    }

    Ok(())
}
