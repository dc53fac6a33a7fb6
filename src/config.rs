//! Inspector configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! no file at all) is valid. Validation runs after loading.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::collector::GatheringRole;
use crate::timeline::Component;

// ============================================================================
// Defaults
// ============================================================================

/// Default STUN servers (first is primary)
pub const DEFAULT_STUN_SERVERS: [&str; 2] = ["stun.l.google.com:19302", "stun1.l.google.com:19302"];

/// Default TURN relays, as `turn:` / `turns:` URLs
pub const DEFAULT_TURN_SERVERS: [&str; 2] = [
    "turn:openrelay.metered.ca:80",
    "turn:openrelay.metered.ca:443?transport=tcp",
];

/// Fixed budget for a single STUN binding probe
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;

/// Gathering upper bound for the side creating the offer
pub const DEFAULT_OFFERER_GATHERING_MS: u64 = 10_000;

/// Gathering upper bound for the side producing the answer
pub const DEFAULT_ANSWERER_GATHERING_MS: u64 = 5_000;

// ============================================================================
// Configuration
// ============================================================================

/// Per-role gathering deadlines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatheringTimeouts {
    pub offerer_ms: u64,
    pub answerer_ms: u64,
}

impl Default for GatheringTimeouts {
    fn default() -> Self {
        Self {
            offerer_ms: DEFAULT_OFFERER_GATHERING_MS,
            answerer_ms: DEFAULT_ANSWERER_GATHERING_MS,
        }
    }
}

impl GatheringTimeouts {
    pub fn for_role(&self, role: GatheringRole) -> Duration {
        match role {
            GatheringRole::Offerer => Duration::from_millis(self.offerer_ms),
            GatheringRole::Answerer => Duration::from_millis(self.answerer_ms),
        }
    }
}

/// Display names for the five logical actors tagged on timeline events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentNames {
    pub web_client: String,
    pub signaling: String,
    pub stun_server: String,
    pub turn_server: String,
    pub media_server: String,
}

impl Default for ComponentNames {
    fn default() -> Self {
        Self {
            web_client: "Web Client".to_string(),
            signaling: "Signaling".to_string(),
            stun_server: "STUN Server".to_string(),
            turn_server: "TURN Server".to_string(),
            media_server: "Media Server".to_string(),
        }
    }
}

impl ComponentNames {
    pub fn name(&self, component: Component) -> &str {
        match component {
            Component::WebClient => &self.web_client,
            Component::Signaling => &self.signaling,
            Component::StunServer => &self.stun_server,
            Component::TurnServer => &self.turn_server,
            Component::MediaServer => &self.media_server,
        }
    }
}

/// Configuration consumed by the inspector core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// STUN servers as host:port, ordered, first is primary
    pub stun_servers: Vec<String>,
    /// TURN relays offered to the peers; empty means relaying is not configured
    pub turn_servers: Vec<String>,
    /// Budget for each STUN probe in milliseconds
    pub probe_timeout_ms: u64,
    /// Run the CHANGE-REQUEST filtering probe to pin down the cone subtype
    pub filtering_probe: bool,
    /// Gathering deadlines per role
    pub gathering: GatheringTimeouts,
    /// Component display names
    pub components: ComponentNames,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            stun_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            turn_servers: DEFAULT_TURN_SERVERS.iter().map(|s| s.to_string()).collect(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            filtering_probe: false,
            gathering: GatheringTimeouts::default(),
            components: ComponentNames::default(),
        }
    }
}

impl InspectorConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: InspectorConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stun_servers.is_empty() {
            return Err(ConfigError::Invalid("stun_servers must not be empty".into()));
        }
        if let Some(bad) = self.turn_servers.iter().find(|url| !is_turn_url(url)) {
            return Err(ConfigError::Invalid(format!(
                "turn server '{}' must be a turn: or turns: URL with a host",
                bad
            )));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe_timeout_ms must be positive".into()));
        }
        if self.gathering.offerer_ms == 0 || self.gathering.answerer_ms == 0 {
            return Err(ConfigError::Invalid("gathering timeouts must be positive".into()));
        }
        if self.gathering.offerer_ms < self.gathering.answerer_ms {
            return Err(ConfigError::Invalid(format!(
                "offerer gathering timeout ({} ms) must not be shorter than answerer's ({} ms)",
                self.gathering.offerer_ms, self.gathering.answerer_ms
            )));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Resolve the STUN server list, preserving order
    ///
    /// Unresolvable entries are skipped with a warning; only the first
    /// address of each entry is kept so the list stays one-per-server.
    pub fn resolve_stun_servers(&self) -> Vec<SocketAddr> {
        let mut resolved = Vec::with_capacity(self.stun_servers.len());
        for server in &self.stun_servers {
            match server.to_socket_addrs() {
                Ok(mut addrs) => match addrs.next() {
                    Some(addr) => resolved.push(addr),
                    None => log::warn!("STUN server '{}' resolved to no addresses", server),
                },
                Err(e) => log::warn!("Skipping STUN server '{}': {}", server, e),
            }
        }
        resolved
    }
}

fn is_turn_url(url: &str) -> bool {
    url.strip_prefix("turns:")
        .or_else(|| url.strip_prefix("turn:"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with(':'))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file could not be read
    Io(String),
    /// JSON did not match the expected shape
    Parse(String),
    /// Values failed validation
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
