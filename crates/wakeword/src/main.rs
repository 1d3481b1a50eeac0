//! wakeword - streaming wake-word detection server and test client
//!
//! Subcommands:
//! - `wakeword serve` - Run the HTTP/WebSocket detection server
//! - `wakeword stream <wav>` - Stream a WAV file through a running server
//! - `wakeword health` - Query a running server's health
//! - `wakeword config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use wakeconf::WakeConfig;
use wakeword::client::{self, WakeClient};
use wakeword::serve::{self, ServeConfig};
use wakeword::telemetry;

#[derive(Parser)]
#[command(name = "wakeword")]
#[command(about = "Streaming wake-word detection over HTTP and WebSocket")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection server
    Serve {
        /// HTTP port to bind (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Config file (replaces ./wakeword.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// OTLP gRPC endpoint for OpenTelemetry (e.g., "localhost:4317")
        #[arg(long)]
        otlp_endpoint: Option<String>,

        /// Directory of static files served at /
        #[arg(long)]
        public_dir: Option<PathBuf>,
    },

    /// Stream a 16 kHz mono 16-bit WAV file to a running server
    Stream {
        /// WAV file to stream
        wav: PathBuf,

        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:5000")]
        server: String,

        /// Pause between requests in milliseconds
        #[arg(long, default_value = "5")]
        delay_ms: u64,
    },

    /// Print a running server's health
    Health {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:5000")]
        server: String,
    },

    /// Print the effective configuration and where it came from
    Config {
        /// Config file (replaces ./wakeword.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            config,
            otlp_endpoint,
            public_dir,
        } => {
            let mut config = WakeConfig::load_from(config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(port) = port {
                config.infra.bind.port = port;
            }
            if let Some(host) = host {
                config.infra.bind.host = host;
            }
            if let Some(endpoint) = otlp_endpoint {
                config.infra.telemetry.otlp_endpoint = Some(endpoint);
            }
            if let Some(dir) = public_dir {
                config.infra.paths.public_dir = dir;
            }

            let _telemetry = telemetry::init(
                &config.infra.telemetry.log_level,
                config.infra.telemetry.otlp_endpoint.as_deref(),
            )?;

            let serve_config = ServeConfig::from_config(&config)?;
            let factory = wakeword::default_factory()?;
            serve::run(serve_config, factory).await?;
        }
        Commands::Stream {
            wav,
            server,
            delay_ms,
        } => {
            let _telemetry = telemetry::init("info", None)?;
            let client = WakeClient::new(&server);
            let outcome =
                client::stream_wav(&client, &wav, Duration::from_millis(delay_ms)).await?;

            println!("Session: {}", outcome.session.session_id);
            match outcome.detection {
                Some(reply) => {
                    let keyword = reply
                        .keyword_index
                        .and_then(|i| outcome.session.keywords.get(i))
                        .map(String::as_str)
                        .unwrap_or("?");
                    println!(
                        "Wake word detected after {} chunks: {} (index {:?})",
                        outcome.chunks_sent, keyword, reply.keyword_index
                    );
                }
                None => println!("No wake word in {} chunks", outcome.chunks_sent),
            }
        }
        Commands::Health { server } => {
            let health = WakeClient::new(&server).health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Commands::Config { config } => {
            let (config, sources) = WakeConfig::load_with_sources_from(config.as_deref())
                .context("Failed to load configuration")?;

            print!("{}", config.to_toml());
            println!();
            if sources.files.is_empty() {
                println!("# No config files found; using defaults");
            }
            for file in &sources.files {
                println!("# Loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# Env override: {}", var);
            }
        }
    }

    Ok(())
}
