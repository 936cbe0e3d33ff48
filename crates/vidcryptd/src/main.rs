//! vidcryptd: encrypted video storage and range-streaming daemon
//!
//! Usage:
//!   vidcryptd [--config /etc/vidcrypt/config.toml] [--listen 0.0.0.0:5000]
//!
//! Uploads are encrypted at rest (AES-256-CBC) and decrypted on the fly for
//! HTTP range requests. See `vidcrypt-crypto` for the blob format.

mod daemon;
mod http;
mod metrics;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

use vidcrypt_core::config::VidcryptConfig;

#[derive(Parser, Debug)]
#[command(
    name = "vidcryptd",
    version,
    about = "Encrypted video storage and range-streaming daemon"
)]
struct Cli {
    /// Path to vidcrypt.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "VIDCRYPT_CONFIG",
        default_value = "/etc/vidcrypt/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides daemon.log_level
    #[arg(long, env = "VIDCRYPT_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides daemon.log_format
    #[arg(long, env = "VIDCRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// HTTP listen address; overrides daemon.listen
    #[arg(long, env = "VIDCRYPT_LISTEN")]
    listen: Option<String>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let mut config = VidcryptConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.daemon.log_level);
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.daemon.log_format, true)
            .map_err(|e| anyhow::anyhow!("daemon.log_format: {e}"))?,
    };
    init_logging(level, &format);

    if !config_found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }
    if let Some(listen) = cli.listen {
        config.daemon.listen = listen;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        listen = %config.daemon.listen,
        "vidcryptd starting"
    );

    daemon::run(config).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
