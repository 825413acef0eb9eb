//! Configuration management

mod relay;

pub use relay::{parse_relay_url, RelayConfig};

use relay::default_cipher;

use crate::crypto::CipherSuite;
use crate::routing::{HostRule, RoutingTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown relay '{0}'")]
    UnknownRelay(String),
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay used by pattern rules
    pub default_relay: Option<String>,
    /// Local CONNECT proxy
    pub proxy: ProxyConfig,
    /// Named relays
    pub relays: Vec<RelayConfig>,
    /// Pattern rules, first enabled match wins
    pub rules: Vec<HostRule>,
    /// Exact hostname -> relay name
    pub overrides: BTreeMap<String, String>,
    /// Relay server (remote side)
    pub relay_server: Option<RelayServerConfig>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;

        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Look up a relay by name
    pub fn relay(&self, name: &str) -> Result<&RelayConfig, ConfigError> {
        self.relays
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ConfigError::UnknownRelay(name.to_string()))
    }

    /// The relay named by `default_relay`, if any
    pub fn default_relay_config(&self) -> Result<Option<RelayConfig>, ConfigError> {
        self.default_relay
            .as_deref()
            .map(|name| self.relay(name).cloned())
            .transpose()
    }

    /// Build the routing table described by this config
    pub fn routing_table(&self) -> Result<RoutingTable, ConfigError> {
        let table = RoutingTable::new(self.default_relay_config()?);
        table.set_rules(self.rules.clone());
        for (hostname, relay_name) in &self.overrides {
            table.add_host_rule(hostname, self.relay(relay_name)?.clone());
        }
        Ok(table)
    }
}

/// Local proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Listen address; port 0 picks an ephemeral port
    pub listen: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:0".to_string(),
        }
    }
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayServerConfig {
    /// Listen address
    pub listen: String,
    /// Cipher accepted from clients
    #[serde(default = "default_cipher")]
    pub cipher: CipherSuite,
    /// Shared password
    pub password: String,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8388".to_string(),
            cipher: default_cipher(),
            password: String::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an env-filter directive
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<HostRule>,
}

/// Load a flat `[[rules]]` list
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<Vec<HostRule>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let file: RulesFile = toml::from_str(&content)?;
    Ok(file.rules)
}

/// Persist a flat `[[rules]]` list
pub fn save_rules<P: AsRef<Path>>(path: P, rules: &[HostRule]) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(&RulesFile {
        rules: rules.to_vec(),
    })?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    let relay = RelayConfig::new(
        "primary",
        "relay.example.com",
        crate::protocol::DEFAULT_RELAY_PORT,
        CipherSuite::Aes256Gcm,
        "change-me",
    );

    Config {
        default_relay: Some("primary".to_string()),
        proxy: ProxyConfig::default(),
        relays: vec![relay],
        rules: vec![
            HostRule::new("*.openai.com", true),
            HostRule::new("*.anthropic.com", true),
        ],
        overrides: BTreeMap::new(),
        relay_server: None,
        logging: LoggingConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_relay = "home"

[proxy]
listen = "127.0.0.1:7890"

[[relays]]
name = "home"
host = "relay.home.example"
cipher = "chacha20-ietf-poly1305"
password = "pw1"

[[relays]]
name = "work"
host = "relay.work.example"
port = 9000
password = "pw2"

[[rules]]
pattern = "*.openai.com"
enabled = true

[[rules]]
pattern = "disabled.example"
enabled = false

[overrides]
"api.example.com" = "work"
"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.proxy.listen, "127.0.0.1:7890");
        assert_eq!(config.relays.len(), 2);
        assert_eq!(config.relays[0].cipher, CipherSuite::ChaCha20Poly1305);
        assert_eq!(config.relays[0].port, 8388);
        assert_eq!(config.relays[1].cipher, CipherSuite::Aes256Gcm);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_relay_and_server_share_default_cipher() {
        let config: Config = toml::from_str(
            r#"
[relay_server]
listen = "0.0.0.0:8388"
password = "shared"

[[relays]]
name = "home"
host = "relay.home.example"
password = "shared"
"#,
        )
        .unwrap();

        let server = config.relay_server.as_ref().unwrap();
        assert_eq!(server.cipher, CipherSuite::Aes256Gcm);
        assert_eq!(server.cipher, config.relays[0].cipher);
        assert_eq!(RelayServerConfig::default().cipher, server.cipher);
    }

    #[test]
    fn test_routing_table_from_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let table = config.routing_table().unwrap();

        assert_eq!(table.should_route("chat.openai.com").unwrap().name, "home");
        assert_eq!(table.should_route("api.example.com").unwrap().name, "work");
        assert!(table.should_route("disabled.example").is_none());
    }

    #[test]
    fn test_unknown_override_relay() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config
            .overrides
            .insert("x.example".to_string(), "missing".to_string());
        assert!(matches!(
            config.routing_table(),
            Err(ConfigError::UnknownRelay(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = generate_example_config();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.relays, config.relays);
        assert_eq!(loaded.rules, config.rules);
        assert_eq!(loaded.default_relay.as_deref(), Some("primary"));
    }

    #[test]
    fn test_rules_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");

        let rules = vec![
            HostRule::new("*.openai.com", true),
            HostRule::new(".claude.ai", false),
        ];
        save_rules(&path, &rules).unwrap();
        assert_eq!(load_rules(&path).unwrap(), rules);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/shadowroute.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
