//! Receiver configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PXUP_CONFIG or --config)
//! 3. Environment variables

use pxup_core::GrowthStrategy;
use pxup_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Receiver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Surface configuration.
    pub surface: SurfaceConfig,
    /// Frame decoder configuration.
    pub decoder: DecoderConfig,
    /// Statistics logging configuration.
    pub stats: StatsConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|key| std::env::var(key).ok());
    }

    /// Applies overrides from an environment-like lookup.
    fn apply_overrides(&mut self, env: EnvLookup<'_>) {
        self.network.apply_overrides(env);
        self.surface.apply_overrides(env);
        self.decoder.apply_overrides(env);
        self.stats.apply_overrides(env);
        self.metrics.apply_overrides(env);
    }

    /// Checks values that would make the receiver unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "surface must be at least 1x1, got {}x{}",
                self.surface.width, self.surface.height
            )));
        }
        if self.metrics.enabled && self.metrics.bind_addr == self.network.bind_addr {
            return Err(ConfigError::ValidationError(format!(
                "metrics and stream listeners both bound to {}",
                self.network.bind_addr
            )));
        }
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Disable Nagle's algorithm on accepted streams.
    pub nodelay: bool,
    /// Longest a read may wait for bytes, in milliseconds (0 = no limit).
    pub read_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            nodelay: true,
            read_timeout_ms: 0,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, env: EnvLookup<'_>) {
        if let Some(addr) = env("PXUP_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Some(nodelay) = env("PXUP_NODELAY") {
            self.nodelay = parse_bool(&nodelay);
        }

        if let Some(timeout) = env("PXUP_READ_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.read_timeout_ms = ms;
            }
        }
    }

    /// Returns the read timeout, if one is set.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

/// Surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: u16,
    pub height: u16,
    /// Fill the surface with black when a client connects.
    pub clear_on_connect: bool,
    /// Where to write a PPM snapshot of the surface on shutdown.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 280,
            height: 240,
            clear_on_connect: true,
            snapshot_path: None,
        }
    }
}

impl SurfaceConfig {
    fn apply_overrides(&mut self, env: EnvLookup<'_>) {
        if let Some(width) = env("PXUP_WIDTH") {
            if let Ok(n) = width.parse() {
                self.width = n;
            }
        }

        if let Some(height) = env("PXUP_HEIGHT") {
            if let Ok(n) = height.parse() {
                self.height = n;
            }
        }

        if let Some(clear) = env("PXUP_CLEAR_ON_CONNECT") {
            self.clear_on_connect = parse_bool(&clear);
        }

        if let Some(path) = env("PXUP_SNAPSHOT_PATH") {
            self.snapshot_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
    }

    /// Returns the number of addressable pixels.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Frame decoder configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Hard cap on entries per frame (0 = surface area only).
    pub max_entries: usize,
    /// Update buffer growth strategy.
    pub growth: GrowthStrategy,
}

impl DecoderConfig {
    fn apply_overrides(&mut self, env: EnvLookup<'_>) {
        if let Some(max) = env("PXUP_MAX_ENTRIES") {
            if let Ok(n) = max.parse() {
                self.max_entries = n;
            }
        }

        if let Some(growth) = env("PXUP_GROWTH") {
            if let Some(strategy) = GrowthStrategy::parse(&growth) {
                self.growth = strategy;
            }
        }
    }

    pub fn max_entries(&self) -> Option<usize> {
        (self.max_entries > 0).then_some(self.max_entries)
    }
}

/// Statistics logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between statistics lines (0 = disabled).
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 2 }
    }
}

impl StatsConfig {
    fn apply_overrides(&mut self, env: EnvLookup<'_>) {
        if let Some(interval) = env("PXUP_STATS_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.interval_secs = secs;
            }
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_METRICS_PORT)),
        }
    }
}

impl MetricsConfig {
    fn apply_overrides(&mut self, env: EnvLookup<'_>) {
        if let Some(enabled) = env("PXUP_METRICS_ENABLED") {
            self.enabled = parse_bool(&enabled);
        }
        if let Some(addr) = env("PXUP_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), 8090);
        assert!(config.network.nodelay);
        assert!(config.network.read_timeout().is_none());
        assert_eq!(config.surface.area(), 280 * 240);
        assert!(config.surface.clear_on_connect);
        assert!(config.decoder.max_entries().is_none());
        assert_eq!(config.decoder.growth, GrowthStrategy::Exact);
        assert_eq!(config.stats.interval(), Duration::from_secs(2));
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&lookup(&[
            ("PXUP_BIND", "127.0.0.1:9000"),
            ("PXUP_NODELAY", "false"),
            ("PXUP_READ_TIMEOUT_MS", "1500"),
            ("PXUP_WIDTH", "320"),
            ("PXUP_HEIGHT", "170"),
            ("PXUP_CLEAR_ON_CONNECT", "0"),
            ("PXUP_SNAPSHOT_PATH", "/tmp/last.ppm"),
            ("PXUP_MAX_ENTRIES", "4096"),
            ("PXUP_GROWTH", "headroom"),
            ("PXUP_STATS_INTERVAL", "0"),
            ("PXUP_METRICS_ENABLED", "true"),
        ]));

        assert_eq!(config.network.bind_addr.port(), 9000);
        assert!(!config.network.nodelay);
        assert_eq!(
            config.network.read_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.surface.width, 320);
        assert_eq!(config.surface.height, 170);
        assert!(!config.surface.clear_on_connect);
        assert_eq!(
            config.surface.snapshot_path,
            Some(PathBuf::from("/tmp/last.ppm"))
        );
        assert_eq!(config.decoder.max_entries(), Some(4096));
        assert_eq!(config.decoder.growth, GrowthStrategy::Headroom);
        assert_eq!(config.stats.interval(), Duration::ZERO);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let mut config = Config::default();
        config.apply_overrides(&lookup(&[
            ("PXUP_BIND", "not an address"),
            ("PXUP_WIDTH", "-3"),
            ("PXUP_GROWTH", "quadratic"),
        ]));

        assert_eq!(config.network.bind_addr.port(), 8090);
        assert_eq!(config.surface.width, 280);
        assert_eq!(config.decoder.growth, GrowthStrategy::Exact);
    }

    #[test]
    fn test_validate_rejects_empty_surface() {
        let mut config = Config::default();
        config.surface.height = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_shared_bind() {
        let mut config = Config::default();
        config.metrics.enabled = true;
        config.metrics.bind_addr = config.network.bind_addr;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pxup.yaml");
        std::fs::write(
            &path,
            "network:\n  bind_addr: \"127.0.0.1:7000\"\nsurface:\n  width: 128\n  height: 64\ndecoder:\n  growth: headroom\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.network.bind_addr.port(), 7000);
        assert_eq!(config.surface.width, 128);
        assert_eq!(config.surface.height, 64);
        assert_eq!(config.decoder.growth, GrowthStrategy::Headroom);
        // Unspecified sections fall back to defaults
        assert_eq!(config.stats.interval_secs, 2);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/pxup.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_, _))));
    }
}
