//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives and utilities for the core runtime."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_target_cities() -> Vec<String> {
    vec!["San Jose".to_owned()]
}

fn default_health_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_load_interval() -> Duration {
    Duration::from_secs(900)
}

fn default_tick() -> Duration {
    Duration::from_secs(5)
}

fn default_stabilization() -> Duration {
    Duration::from_secs(45)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_target() -> String {
    "8.8.8.8".to_owned()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_container_runtime() -> String {
    "docker".to_owned()
}

fn default_tunnel_container() -> String {
    "gluetun".to_owned()
}

fn default_compose_bin() -> String {
    "docker-compose".to_owned()
}

fn default_compose_file() -> Option<PathBuf> {
    Some(PathBuf::from("/project/docker-compose.yml"))
}

fn default_activation_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/project/.env")
}

fn default_endpoint_port() -> u16 {
    51820
}

fn default_api_url() -> String {
    "https://api.protonmail.ch".to_owned()
}

fn default_app_version() -> String {
    "Other".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_session_file() -> PathBuf {
    PathBuf::from("/data/session.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/warden/logs")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/warden/cache")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object for the Warden runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub locality: LocalityConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub activation: ActivationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "WARDEN_CONFIG";

    /// Load configuration together with the effective source path.
    ///
    /// The `WARDEN_CONFIG` variable takes precedence over `candidates` and
    /// must name an existing file. When none of the candidates exist the
    /// defaults are returned; every setting can also come from the CLI.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.locality.validate()?;
        self.timing.validate()?;
        self.probe.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Cities and country the controller may select endpoints from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalityConfig {
    #[serde(default = "default_target_cities")]
    pub cities: Vec<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Default for LocalityConfig {
    fn default() -> Self {
        Self {
            cities: default_target_cities(),
            country: None,
        }
    }
}

impl LocalityConfig {
    /// Parse a comma separated city list such as `"San Jose, Los Angeles"`.
    pub fn parse_cities(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|city| !city.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.cities.iter().all(|city| city.trim().is_empty()) {
            return Err(anyhow!("locality must name at least one target city"));
        }
        Ok(())
    }
}

/// Controller loop timing.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_health_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub health_interval: Duration,
    #[serde(default = "default_load_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub load_interval: Duration,
    #[serde(default = "default_tick")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub tick: Duration,
    #[serde(default = "default_stabilization")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stabilization: Duration,
    #[serde(default = "default_error_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub error_backoff: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            health_interval: default_health_interval(),
            load_interval: default_load_interval(),
            tick: default_tick(),
            stabilization: default_stabilization(),
            error_backoff: default_error_backoff(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.health_interval.is_zero() {
            return Err(anyhow!("timing.health_interval must be greater than zero"));
        }
        if self.load_interval.is_zero() {
            return Err(anyhow!("timing.load_interval must be greater than zero"));
        }
        if self.tick.is_zero() {
            return Err(anyhow!("timing.tick must be greater than zero"));
        }
        Ok(())
    }
}

/// Reachability probe issued inside the tunnel container.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_target")]
    pub target: String,
    #[serde(default = "default_probe_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    #[serde(default = "default_container_runtime")]
    pub runtime: String,
    #[serde(default = "default_tunnel_container")]
    pub container: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: default_probe_target(),
            timeout: default_probe_timeout(),
            attempts: default_probe_attempts(),
            runtime: default_container_runtime(),
            container: default_tunnel_container(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(anyhow!("probe.attempts must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("probe.timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Commands used to make a newly written endpoint live.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    #[serde(default = "default_compose_bin")]
    pub compose_bin: String,
    /// Passed as `-f` only when the file exists at activation time.
    #[serde(default = "default_compose_file")]
    pub compose_file: Option<PathBuf>,
    #[serde(default = "default_tunnel_container")]
    pub service: String,
    #[serde(default = "default_container_runtime")]
    pub runtime: String,
    #[serde(default = "default_tunnel_container")]
    pub container: String,
    #[serde(default = "default_activation_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            compose_bin: default_compose_bin(),
            compose_file: default_compose_file(),
            service: default_tunnel_container(),
            runtime: default_container_runtime(),
            container: default_tunnel_container(),
            timeout: default_activation_timeout(),
        }
    }
}

/// Location and key names of the `KEY=VALUE` endpoint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub keys: StoreKeys,
    #[serde(default = "default_endpoint_port")]
    pub endpoint_port: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            keys: StoreKeys::default(),
            endpoint_port: default_endpoint_port(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        let keys = [
            &self.keys.name,
            &self.keys.address,
            &self.keys.port,
            &self.keys.public_key,
        ];
        for key in keys {
            if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
                return Err(anyhow!("store key {:?} is not a valid variable name", key));
            }
        }
        for (idx, key) in keys.iter().enumerate() {
            if keys[idx + 1..].contains(key) {
                return Err(anyhow!("store key {} is assigned to more than one setting", key));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreKeys {
    pub name: String,
    pub address: String,
    pub port: String,
    pub public_key: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            name: "ENDPOINT_NAME".to_owned(),
            address: "ENDPOINT_ADDRESS".to_owned(),
            port: "ENDPOINT_PORT".to_owned(),
            public_key: "ENDPOINT_KEY".to_owned(),
        }
    }
}

/// Upstream directory service.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            app_version: default_app_version(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Account name, only used for log context.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: None,
            session_file: default_session_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_intervals() {
        let config = AppConfig::default();
        assert_eq!(config.timing.health_interval, Duration::from_secs(60));
        assert_eq!(config.timing.load_interval, Duration::from_secs(900));
        assert_eq!(config.timing.tick, Duration::from_secs(5));
        assert_eq!(config.timing.stabilization, Duration::from_secs(45));
        assert_eq!(config.timing.error_backoff, Duration::from_secs(30));
        assert_eq!(config.probe.attempts, 3);
        assert_eq!(config.store.endpoint_port, 51820);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config: AppConfig = r#"
            [locality]
            cities = ["Zurich", "Geneva"]
            country = "CH"

            [timing]
            health_interval = 30
            load_interval = 600

            [store]
            path = "/tmp/tunnel.env"

            [store.keys]
            name = "SERVER_NAME"
            address = "WIREGUARD_ENDPOINT_IP"
            port = "WIREGUARD_ENDPOINT_PORT"
            public_key = "WIREGUARD_PUBLIC_KEY"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.locality.cities, vec!["Zurich", "Geneva"]);
        assert_eq!(config.locality.country.as_deref(), Some("CH"));
        assert_eq!(config.timing.health_interval, Duration::from_secs(30));
        assert_eq!(config.timing.tick, Duration::from_secs(5));
        assert_eq!(config.store.keys.name, "SERVER_NAME");
        assert_eq!(config.store.path, PathBuf::from("/tmp/tunnel.env"));
    }

    #[test]
    fn rejects_zero_interval_and_empty_cities() {
        let err = "[timing]\nload_interval = 0\n".parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("load_interval"));

        let err = "[locality]\ncities = []\n".parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("target city"));
    }

    #[test]
    fn rejects_duplicate_store_keys() {
        let mut config = AppConfig::default();
        config.store.keys.port = config.store.keys.address.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn city_list_is_trimmed() {
        assert_eq!(
            LocalityConfig::parse_cities(" San Jose,Los Angeles , ,"),
            vec!["San Jose", "Los Angeles"]
        );
    }

    #[test]
    fn missing_candidates_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_with_source(&[dir.path().join("absent.toml")]).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.locality.cities, vec!["San Jose"]);
    }
}
