mod store;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::FileSettings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use weldlink_lib::WelderSession;
use weldlink_lib::diag::TracingSink;
use weldlink_lib::scanner::DeviceGeneration;
use weldlink_lib::settings::SettingsStore;
use weldlink_lib::transport::SystemTransportFactory;

#[derive(Parser)]
#[command(name = "weldlink", about = "Talk to a WELD-CTRL weld controller")]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    /// Settings file holding the last-known-good endpoint.
    #[arg(long, default_value = "weldlink-settings.json")]
    settings: PathBuf,

    /// Send frames in plaintext instead of the ciphered variant.
    #[arg(long)]
    plaintext: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Discover the controller (network first, then serial).
    Scan {
        /// Only try the tunnel endpoint.
        #[arg(long, conflicts_with = "serial_only")]
        network_only: bool,
        /// Only scan serial ports.
        #[arg(long)]
        serial_only: bool,
        /// Pin the serial scan to one port (requires --serial-only).
        #[arg(long, requires = "serial_only")]
        port: Option<String>,
        /// Baud rate for the pinned port.
        #[arg(long, default_value_t = 19_200, requires = "port")]
        baud: u32,
    },
    /// Read and print the 256-byte configuration record.
    Config,
    /// Read one telemetry snapshot.
    Params,
    /// Read the lifetime weld counter.
    Count,
    /// Ask the unit for its type string.
    Type,
    /// Poll telemetry in a loop.
    Monitor {
        /// Milliseconds between polls.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbosity.tracing_level_filter().into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time(),
        )
        .init();

    let settings: Arc<dyn SettingsStore> = Arc::new(FileSettings::load(cli.settings.clone()));
    let mut session = WelderSession::new(
        Arc::new(SystemTransportFactory),
        settings,
        Arc::new(TracingSink),
    )
    .with_encryption(!cli.plaintext);

    let result = run(&mut session, &cli.command).await;
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(session: &mut WelderSession, cmd: &Cmd) -> Result<(), weldlink_lib::WeldError> {
    match cmd {
        Cmd::Scan {
            network_only,
            serial_only,
            port,
            baud,
        } => {
            let scanner = session.scanner();
            let outcome = if *network_only {
                scanner.scan_network_only().await?
            } else if *serial_only {
                let pinned = port.clone().map(|p| (p, *baud));
                scanner.scan_serial_only(pinned).await?
            } else {
                scanner.scan_all().await?
            };

            for attempt in &outcome.attempts {
                let verdict = if attempt.success { "ok" } else { "failed" };
                let detail = attempt.error_detail.as_deref().unwrap_or("-");
                println!("{:<24} {verdict:<8} {detail}", attempt.endpoint.to_string());
            }
            let endpoint = outcome.endpoint.clone();
            let generation = outcome.generation;
            session.adopt(outcome);
            match endpoint {
                Some(endpoint) => {
                    println!("device found on {endpoint} ({})", session.state());
                    if let Some(DeviceGeneration::New { version: Some(v) }) = generation {
                        println!("new-generation unit, sub-version {v}");
                    }
                    Ok(())
                }
                None => Err(weldlink_lib::WeldError::DeviceNotFound),
            }
        }
        Cmd::Config => {
            session.ensure_connected("config read requested").await?;
            let rec = session.read_configuration().await?;
            println!("device type:    {}", rec.device_type);
            println!("language:       {}", rec.language);
            println!("serial number:  {}", rec.serial_number);
            for (i, name) in rec.owner_name.iter().enumerate() {
                println!("owner line {}:   {}", i + 1, name);
            }
            println!("manufactured:   {:?}", rec.manufacture_date);
            println!("calibrated:     {:?}", rec.calibration_date);
            println!("adc offset:     {}", rec.adc_offset);
            println!("lock:           {} (code {})", rec.lock_type, rec.lock_code);
            println!("gps config:     {}", rec.gps_config);
            println!(
                "checksum:       stored {:#06x}, computed {:#06x} ({})",
                rec.stored_checksum,
                rec.computed_checksum,
                if rec.checksum_ok() { "ok" } else { "MISMATCH" }
            );
            Ok(())
        }
        Cmd::Params => {
            session.ensure_connected("telemetry read requested").await?;
            let t = session.read_weld_parameters().await?;
            print_telemetry(&t);
            Ok(())
        }
        Cmd::Count => {
            session.ensure_connected("weld count requested").await?;
            let count = session.read_weld_count().await?;
            println!("weld count: {count}");
            Ok(())
        }
        Cmd::Type => {
            session.ensure_connected("type query requested").await?;
            let type_string = session.query_type().await?;
            println!("device type: {type_string}");
            Ok(())
        }
        Cmd::Monitor { interval_ms } => {
            session.ensure_connected("monitor started").await?;
            let interval = Duration::from_millis(*interval_ms);
            loop {
                match session.read_weld_parameters().await {
                    Ok(t) => print_telemetry(&t),
                    Err(e) => eprintln!("poll failed: {e}"),
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

fn print_telemetry(t: &weldlink_lib::telemetry::WeldTelemetry) {
    println!(
        "U = {:6.2} V   I = {:6.2} A   adc[U] = {:#06x}   adc[I] = {:#06x}",
        t.voltage, t.current, t.adc_voltage, t.adc_current
    );
}
