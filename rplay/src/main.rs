//! rplay — entry point.
//!
//! ```text
//! rplay host [--port N]            Capture, encode and serve one client
//! rplay client <ip> [--port N]     Connect, decode and present
//! rplay encoders                   Show which encoder backends resolve
//! rplay --config <path> ...        Load a custom config TOML
//! rplay --gen-config               Write default config to stdout
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, error::ErrorKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rplay::app;
use rplay::config::{ConfigSource, RplayConfig};
use rplay::present::LogPresenter;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rplay", version, about = "Stream a display from a host to a client over TCP")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rplay.toml", global = true)]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Capture the local display and stream it to one client.
    Host {
        /// Port to listen on (overrides network.port).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Connect to a host and present its stream.
    Client {
        /// Host IP address.
        ip: IpAddr,
        /// Port to connect to (overrides network.port).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List encoder backends in preference order with their availability.
    Encoders,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&RplayConfig::default())?;
        println!("{text}");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(mode) = cli.mode else {
        Cli::command()
            .error(ErrorKind::MissingSubcommand, "a mode is required: host, client or encoders")
            .exit();
    };

    // Load config.
    let (config, source) = RplayConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rplay v{}", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File => info!(path = %cli.config.display(), "config loaded"),
        ConfigSource::Missing => info!(path = %cli.config.display(), "no config file, using defaults"),
        ConfigSource::Invalid(e) => {
            warn!(path = %cli.config.display(), error = %e, "config file invalid, using defaults")
        }
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        return Ok(ExitCode::from(2));
    }

    let cancel = CancellationToken::new();
    let result = match mode {
        Mode::Encoders => {
            for (backend, status) in app::list_encoders() {
                match status {
                    Ok(()) => println!("{backend:<8} {:<12} available", backend.encoder_name()),
                    Err(e) => println!("{backend:<8} {:<12} {e}", backend.encoder_name()),
                }
            }
            return Ok(ExitCode::SUCCESS);
        }

        Mode::Host { port } => {
            let port = port.unwrap_or(config.network.port);
            info!(port, fps = config.encoder.fps, source = %config.capture.source, "starting host");

            // Ctrl-C handler.
            let stop = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, shutting down");
                stop.cancel();
            });

            app::run_host(&config, port, cancel).await
        }

        Mode::Client { ip, port } => {
            let port = port.unwrap_or(config.network.port);
            info!(%ip, port, "starting client");

            let presenter =
                LogPresenter::new(Duration::from_secs(config.logging.stats_interval_secs.max(1)));
            let close = presenter.close_handle();

            // Ctrl-C stands in for closing the window.
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, closing presenter");
                close.store(true, Ordering::SeqCst);
            });

            app::run_client(&config, ip, port, presenter, cancel).await
        }
    };

    match result {
        Ok(stats) => {
            info!(
                frames = stats.frames_captured.max(stats.frames_presented),
                packets = stats.packets,
                bytes = stats.bytes,
                avg_bytes_per_sec = stats.average_bytes_per_sec(),
                elapsed = ?stats.elapsed,
                "session ended"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("session failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
