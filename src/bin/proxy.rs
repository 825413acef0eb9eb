//! Shadowroute local proxy
//!
//! Listens for HTTP CONNECT on loopback and, per hostname:
//! - routes matching hosts through a Shadowsocks AEAD relay
//! - connects everything else directly

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use shadowroute::{
    config::{generate_example_config, load_rules, Config, LoggingConfig},
    parse_relay_url, HostRule, ProxyHandle,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Shadowroute proxy - per-host relay routing for HTTP CONNECT clients
#[derive(Parser, Debug)]
#[command(name = "shadowroute-proxy")]
#[command(about = "Local CONNECT proxy that routes selected hosts through a relay")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Print an example configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Default relay URL, e.g. ss://host:8388?cipher=aes-256-gcm&password=..
    #[arg(short, long)]
    relay: Option<String>,

    /// Extra pattern rule routed through the default relay (repeatable)
    #[arg(long = "route")]
    routes: Vec<String>,

    /// Load pattern rules from a `[[rules]]` TOML file
    #[arg(long)]
    rules_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_config {
        let example = toml::to_string_pretty(&generate_example_config())
            .context("Failed to render example config")?;
        println!("{}", example);
        return Ok(());
    }

    let config = load_config(&args.config)?;
    init_logging(&config.logging, args.log_level.as_deref());

    let routing = config
        .routing_table()
        .context("Invalid routing configuration")?;

    if let Some(url) = &args.relay {
        let relay = parse_relay_url(url).ok_or_else(|| anyhow!("Invalid relay URL: {}", url))?;
        info!("Default relay: {} ({}:{}, {})", relay.name, relay.host, relay.port, relay.cipher);
        routing.set_default_relay(Some(relay));
    }

    let mut rules = routing.rules();
    if let Some(path) = &args.rules_file {
        let loaded = load_rules(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?;
        info!("Loaded {} rule(s) from {}", loaded.len(), path.display());
        rules.extend(loaded);
    }
    rules.extend(args.routes.iter().map(|pattern| HostRule::new(pattern.as_str(), true)));
    routing.set_rules(rules);

    if routing.default_relay().is_none() && !routing.rules().is_empty() {
        warn!("Pattern rules configured without a default relay - they will connect directly");
    }

    let listen = args.listen.unwrap_or(config.proxy.listen);

    info!("Shadowroute proxy v{}", shadowroute::VERSION);
    let mut handle = ProxyHandle::bind(&listen, Arc::new(routing))
        .await
        .context("Failed to start proxy listener")?;

    info!("Proxy ready on {}", handle.local_addr());
    info!("Configure clients with HTTPS_PROXY=http://{}", handle.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down...");
    handle.stop().await;

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).context("Failed to load configuration")
    } else {
        Ok(Config::default())
    }
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
