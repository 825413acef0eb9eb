//! Per-hostname routing decisions
//!
//! Lookup order:
//! 1. Exact hostname override (its own relay)
//! 2. Pattern rules, first enabled match wins (default relay)
//! 3. Direct
//!
//! The table is shared between connection tasks, so state sits behind a
//! read-write lock. Mutations replace state in a single step.

use crate::config::RelayConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A `{pattern, enabled}` routing rule
///
/// - `*.domain` matches any hostname ending in `.domain`
/// - `.domain` matches any hostname ending in `.domain`
/// - anything else matches the hostname exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRule {
    pub pattern: String,
    pub enabled: bool,
}

impl HostRule {
    pub fn new(pattern: impl Into<String>, enabled: bool) -> Self {
        Self {
            pattern: pattern.into(),
            enabled,
        }
    }

    /// Whether `hostname` (already normalised) matches this rule's pattern
    pub fn matches(&self, hostname: &str) -> bool {
        let pattern = normalize(&self.pattern);
        if let Some(suffix) = pattern.strip_prefix('*') {
            suffix.starts_with('.') && hostname.ends_with(suffix)
        } else if pattern.starts_with('.') {
            hostname.ends_with(pattern.as_str())
        } else {
            hostname == pattern
        }
    }
}

/// Resolved decision for one CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Direct,
    Relay(RelayConfig),
}

impl Route {
    pub fn use_relay(&self) -> bool {
        matches!(self, Route::Relay(_))
    }

    pub fn relay(&self) -> Option<&RelayConfig> {
        match self {
            Route::Relay(relay) => Some(relay),
            Route::Direct => None,
        }
    }
}

#[derive(Debug, Default)]
struct RoutingState {
    rules: Vec<HostRule>,
    overrides: HashMap<String, RelayConfig>,
    default_relay: Option<RelayConfig>,
}

/// Routing table shared by the proxy listener and its control surface
#[derive(Debug, Default)]
pub struct RoutingTable {
    state: RwLock<RoutingState>,
}

impl RoutingTable {
    pub fn new(default_relay: Option<RelayConfig>) -> Self {
        Self {
            state: RwLock::new(RoutingState {
                default_relay,
                ..Default::default()
            }),
        }
    }

    /// Relay to use for `hostname`, or `None` to connect directly
    pub fn should_route(&self, hostname: &str) -> Option<RelayConfig> {
        let hostname = normalize(hostname);
        let state = self.read();

        if let Some(relay) = state.overrides.get(&hostname) {
            return Some(relay.clone());
        }

        let matched = state
            .rules
            .iter()
            .any(|rule| rule.enabled && rule.matches(&hostname));
        if matched {
            return state.default_relay.clone();
        }

        None
    }

    pub fn resolve(&self, hostname: &str) -> Route {
        match self.should_route(hostname) {
            Some(relay) => Route::Relay(relay),
            None => Route::Direct,
        }
    }

    /// Route `hostname` through `relay` regardless of pattern rules
    pub fn add_host_rule(&self, hostname: &str, relay: RelayConfig) {
        self.write().overrides.insert(normalize(hostname), relay);
    }

    /// Drop the override for `hostname`; returns whether one existed
    pub fn remove_host_rule(&self, hostname: &str) -> bool {
        self.write().overrides.remove(&normalize(hostname)).is_some()
    }

    pub fn clear_host_rules(&self) {
        self.write().overrides.clear();
    }

    /// Hostnames with an explicit override
    pub fn host_overrides(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.read().overrides.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Pattern rules in evaluation order
    pub fn rules(&self) -> Vec<HostRule> {
        self.read().rules.clone()
    }

    /// Replace all pattern rules
    pub fn set_rules(&self, rules: Vec<HostRule>) {
        self.write().rules = rules;
    }

    pub fn default_relay(&self) -> Option<RelayConfig> {
        self.read().default_relay.clone()
    }

    pub fn set_default_relay(&self, relay: Option<RelayConfig>) {
        self.write().default_relay = relay;
    }

    /// Forget rules, overrides and the default relay
    pub fn clear(&self) {
        *self.write() = RoutingState::default();
    }

    fn read(&self) -> RwLockReadGuard<'_, RoutingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RoutingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}
