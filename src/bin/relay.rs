//! Shadowroute relay server
//!
//! Accepts Shadowsocks AEAD tunnels and forwards each one to the target
//! named in its address record.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use shadowroute::{
    config::{Config, LoggingConfig, RelayServerConfig},
    CipherSuite, RelayServer,
};
use std::path::PathBuf;
use tracing::info;

/// Shadowroute relay - remote end of the encrypted tunnel
#[derive(Parser, Debug)]
#[command(name = "shadowroute-relay")]
#[command(about = "Shadowsocks AEAD relay server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Cipher (aes-128-gcm, aes-256-gcm, chacha20-ietf-poly1305)
    #[arg(long)]
    cipher: Option<String>,

    /// Shared password (overrides config)
    #[arg(short, long, env = "SHADOWROUTE_PASSWORD")]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config).context("Failed to load configuration")?
    } else {
        Config::default()
    };
    init_logging(&config.logging, args.log_level.as_deref());

    let mut server_config: RelayServerConfig = config.relay_server.clone().unwrap_or_default();
    if let Some(listen) = args.listen {
        server_config.listen = listen;
    }
    if let Some(cipher) = &args.cipher {
        server_config.cipher = CipherSuite::from_name(cipher);
    }
    if let Some(password) = args.password {
        server_config.password = password;
    }
    if server_config.password.is_empty() {
        return Err(anyhow!(
            "No password configured - set [relay_server] password or pass --password"
        ));
    }

    info!("Shadowroute relay v{}", shadowroute::VERSION);
    let server = RelayServer::bind(
        &server_config.listen,
        server_config.cipher,
        &server_config.password,
    )
    .await
    .context("Failed to bind relay listener")?;

    tokio::select! {
        result = server.run() => result.context("Relay server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&logging.level);
    let builder = tracing_subscriber::fmt().with_env_filter(level);

    match logging.format.as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}
