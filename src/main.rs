//! CLI Entry Point for force_daq
//!
//! Provides command-line access to the acquisition engine:
//! - Streaming force samples from a sensor (or a simulated one)
//! - Listing serial ports for diagnostics
//!
//! # Usage
//!
//! Monitor a real sensor:
//! ```bash
//! force_daq monitor --port /dev/ttyUSB0 --baud 9600
//! ```
//!
//! Monitor simulated data as JSON, zeroing after 20 samples:
//! ```bash
//! force_daq monitor --mock --json --zero-after 20 --count 100
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use force_daq::engine::{AcquisitionEngine, BroadcastSink, ConnectionStatus, ForceSample};
use force_daq::hardware::{list_serial_ports, MockOpener, MockSensor, PortOpener, SerialOpener};
use force_daq::{logging, Settings};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const MOCK_PORT: &str = "mock://force-sensor";
const MOCK_BASELINE: [f64; 4] = [0.40, 0.05, 0.20, 0.10];
const MOCK_NOISE: f64 = 0.02;

#[derive(Parser)]
#[command(name = "force_daq")]
#[command(about = "Acquisition engine for 4-axis serial force sensors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream filtered force samples until Ctrl-C
    Monitor(MonitorArgs),

    /// List serial ports visible to the OS
    Ports,
}

#[derive(Args)]
struct MonitorArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port, overrides sensor.port
    #[arg(long)]
    port: Option<String>,

    /// Baud rate, overrides sensor.baud_rate
    #[arg(long)]
    baud: Option<u32>,

    /// Use a simulated sensor instead of a serial port
    #[arg(long)]
    mock: bool,

    /// Print one JSON object per sample
    #[arg(long)]
    json: bool,

    /// Stop after this many samples
    #[arg(long)]
    count: Option<usize>,

    /// Send this line to the sensor after connecting
    #[arg(long)]
    send: Option<String>,

    /// Capture zero calibration after this many samples
    #[arg(long)]
    zero_after: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor(args) => monitor(args).await,
        Commands::Ports => {
            list_ports();
            Ok(())
        }
    }
}

fn list_ports() {
    let ports = list_serial_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
}

async fn monitor(args: MonitorArgs) -> Result<()> {
    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Settings::load()?,
    };
    if let Some(port) = args.port.clone() {
        settings.sensor.port = Some(port);
    }
    if let Some(baud) = args.baud {
        settings.sensor.baud_rate = baud;
    }
    settings.validate()?;
    logging::init_from_settings(&settings)?;

    let opener: Box<dyn PortOpener> = if args.mock {
        let opener = MockOpener::new();
        spawn_mock_feed(opener.register(MOCK_PORT), settings.acquisition.poll_interval / 2);
        settings.sensor.port = Some(MOCK_PORT.to_string());
        Box::new(opener)
    } else {
        Box::new(SerialOpener)
    };

    // Connect explicitly so the outcome can be reported
    let Some(port) = settings.sensor.port.take() else {
        bail!("no sensor port configured; pass --port, set sensor.port or use --mock");
    };

    let sink = Arc::new(BroadcastSink::default());
    let mut samples = sink.subscribe();
    let mut engine = AcquisitionEngine::new(&settings, opener).with_sink(sink);
    engine.start()?;

    match engine
        .connect(&port, settings.sensor.baud_rate)
        .outcome()
        .await?
    {
        ConnectionStatus::Connected { port, baud_rate } => {
            info!(%port, baud_rate, "Monitoring force sensor");
        }
        ConnectionStatus::Unavailable {
            reason,
            available_ports,
        } => {
            shutdown(engine).await?;
            if available_ports.is_empty() {
                bail!("cannot open {port}: {reason} (no serial ports found)");
            }
            bail!(
                "cannot open {port}: {reason} (available: {})",
                available_ports.join(", ")
            );
        }
    }

    if let Some(text) = &args.send {
        engine.send(text).outcome().await??;
        info!(%text, "Sent command to sensor");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut received = 0usize;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            sample = samples.recv() => match sample {
                Ok(sample) => {
                    received += 1;
                    print_sample(&sample, args.json)?;

                    if args.zero_after == Some(received) {
                        let offsets = engine.zero().outcome().await??;
                        info!(?offsets, "Zero calibration applied");
                    }
                    if args.count.is_some_and(|limit| received >= limit) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind, samples dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    shutdown(engine).await
}

async fn shutdown(mut engine: AcquisitionEngine) -> Result<()> {
    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    Ok(())
}

fn print_sample(sample: &ForceSample, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(sample)?);
        return Ok(());
    }

    let v = &sample.vector;
    let f = &sample.frame;
    println!(
        "{}  |F| {:8.4}  ({:+.4}, {:+.4}, {:+.4})  +x {:.4}  -x {:.4}  +y {:.4}  -y {:.4}",
        sample.timestamp.format("%H:%M:%S%.3f"),
        v.magnitude(),
        v.x(),
        v.y(),
        v.z(),
        f.plus_x,
        f.minus_x,
        f.plus_y,
        f.minus_y,
    );
    Ok(())
}

fn spawn_mock_feed(sensor: MockSensor, period: Duration) {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        loop {
            ticker.tick().await;
            sensor.push_noisy_frame(&mut rng, MOCK_BASELINE, MOCK_NOISE);
        }
    });
}
