//! Centralized configuration for Undertow.
//!
//! Everything is read once at startup. Defaults live here; the process
//! environment overrides them and must supply the upstream credentials.

use std::path::PathBuf;
use std::time::Duration;

use crate::eviction::{EvictionPolicy, gigabytes_to_bytes};

/// Announce URLs appended to every swarm Undertow registers.
pub const DEFAULT_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.demonoid.ch:6969/announce",
    "udp://open.demonii.com:1337/announce",
    "udp://open.stealth.si:80/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://explodie.org:6969/announce",
    "udp://tracker2.dler.org:80/announce",
    "udp://tracker.tryhackx.org:6969/announce",
    "udp://tracker.torrust-demo.com:6969/announce",
    "udp://tracker.therarbg.to:6969/announce",
    "udp://tracker.skynetcloud.site:6969/announce",
    "udp://tracker.qu.ax:6969/announce",
    "udp://tracker.hifimarket.in:2710/announce",
    "udp://tracker.gmi.gd:6969/announce",
    "udp://tracker.dler.org:6969/announce",
    "udp://tracker.bittor.pw:1337/announce",
    "udp://tracker.0x7c0.com:6969/announce",
    "udp://tracker-udp.gbitt.info:80/announce",
    "udp://tr4ck3r.duckdns.org:6969/announce",
    "udp://t.overflow.biz:6969/announce",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {name}")]
    MissingVariable { name: String },

    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Central configuration for all Undertow components.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub server: ServerConfig,
    pub swarm: SwarmConfig,
    pub eviction: EvictionPolicy,
    pub catalog: CatalogConfig,
    pub indexer: IndexerConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Single-page app bundle served for non-API paths
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            static_dir: None,
        }
    }
}

/// Swarm engine and request-path settings.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Port the swarm engine accepts peer connections on
    pub listen_port: u16,
    /// Directory downloaded content is written under
    pub storage_root: PathBuf,
    /// Upper bound on waiting for metadata after registration
    pub metadata_timeout: Duration,
    /// Read-ahead window requested for every stream
    pub stream_readahead: u64,
    pub default_trackers: Vec<String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: 42069,
            storage_root: PathBuf::from("./downloads"),
            metadata_timeout: Duration::from_secs(60),
            stream_readahead: 50 * 1024 * 1024,
            default_trackers: DEFAULT_TRACKERS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Movie/show metadata catalog (TMDB API v3).
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Indexer aggregator (Prowlarr API v1).
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9696".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(8),
        }
    }
}

impl UndertowConfig {
    /// Builds configuration from the process environment.
    ///
    /// # Errors
    /// - `ConfigError::MissingVariable` - A required credential is unset or empty
    /// - `ConfigError::InvalidValue` - A numeric variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable source. Empty values
    /// count as unset.
    ///
    /// # Errors
    /// - `ConfigError::MissingVariable` - A required credential is unset or empty
    /// - `ConfigError::InvalidValue` - A numeric variable does not parse
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &str| {
            get(name).ok_or_else(|| ConfigError::MissingVariable {
                name: name.to_string(),
            })
        };

        let mut config = Self::default();

        if let Some(port) = get("PORT") {
            config.server.port = parse_var("PORT", &port)?;
        }
        config.server.static_dir = get("UNDERTOW_STATIC_DIR").map(PathBuf::from);

        if let Some(port) = get("TORRENT_PORT") {
            config.swarm.listen_port = parse_var("TORRENT_PORT", &port)?;
        }
        if let Some(dir) = get("DOWNLOAD_DIR") {
            config.swarm.storage_root = PathBuf::from(dir);
        }
        if let Some(secs) = get("UNDERTOW_METADATA_TIMEOUT_SECS") {
            config.swarm.metadata_timeout =
                Duration::from_secs(parse_var("UNDERTOW_METADATA_TIMEOUT_SECS", &secs)?);
        }

        if let Some(limit) = get("TORRENT_STORAGE_LIMIT_GB") {
            let gigabytes: f64 = parse_var("TORRENT_STORAGE_LIMIT_GB", &limit)?;
            if !gigabytes.is_finite() || gigabytes < 0.0 {
                return Err(ConfigError::InvalidValue {
                    name: "TORRENT_STORAGE_LIMIT_GB".to_string(),
                    value: limit,
                    reason: "must be a non-negative number".to_string(),
                });
            }
            config.eviction.storage_quota = gigabytes_to_bytes(gigabytes);
        }
        if let Some(secs) = get("UNDERTOW_TORRENT_TTL_SECS") {
            config.eviction.inactivity_ttl =
                Duration::from_secs(parse_var("UNDERTOW_TORRENT_TTL_SECS", &secs)?);
        }
        if let Some(ratio) = get("UNDERTOW_MAX_RATIO") {
            config.eviction.max_ratio = parse_var("UNDERTOW_MAX_RATIO", &ratio)?;
        }
        if let Some(secs) = get("UNDERTOW_SWEEP_INTERVAL_SECS") {
            let secs: u64 = parse_var("UNDERTOW_SWEEP_INTERVAL_SECS", &secs)?;
            config.eviction.sweep_interval = Duration::from_secs(secs.max(1));
        }

        config.catalog.api_key = require("TMDB_API_KEY")?;
        config.indexer.base_url = require("PROWLARR_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        config.indexer.api_key = require("PROWLARR_API_KEY")?;

        Ok(config)
    }

    /// Short timeouts and a tiny quota for tests.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.swarm.metadata_timeout = Duration::from_secs(2);
        config.swarm.stream_readahead = 64 * 1024;
        config.swarm.default_trackers = Vec::new();
        config.eviction.storage_quota = 10 * 1024 * 1024;
        config.catalog.api_key = "test-key".to_string();
        config.indexer.api_key = "test-key".to_string();
        config
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TMDB_API_KEY", "tmdb"),
        ("PROWLARR_BASE_URL", "http://prowlarr:9696/"),
        ("PROWLARR_API_KEY", "prowlarr"),
    ];

    #[test]
    fn test_default_config_values() {
        let config = UndertowConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.swarm.listen_port, 42069);
        assert_eq!(config.swarm.storage_root, PathBuf::from("./downloads"));
        assert_eq!(config.swarm.metadata_timeout, Duration::from_secs(60));
        assert_eq!(config.swarm.stream_readahead, 50 * 1024 * 1024);
        assert_eq!(config.swarm.default_trackers.len(), DEFAULT_TRACKERS.len());
        assert_eq!(config.indexer.request_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_required_variables_only() {
        let config = UndertowConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.catalog.api_key, "tmdb");
        assert_eq!(config.indexer.base_url, "http://prowlarr:9696");
        assert_eq!(config.indexer.api_key, "prowlarr");
        assert_eq!(config.eviction, EvictionPolicy::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PORT", "9000"),
            ("TORRENT_PORT", "51413"),
            ("DOWNLOAD_DIR", "/srv/media"),
            ("TORRENT_STORAGE_LIMIT_GB", "1.5"),
            ("UNDERTOW_MAX_RATIO", "3"),
            ("UNDERTOW_TORRENT_TTL_SECS", "120"),
        ]);

        let config = UndertowConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.swarm.listen_port, 51413);
        assert_eq!(config.swarm.storage_root, PathBuf::from("/srv/media"));
        assert_eq!(config.eviction.storage_quota, 1536 * 1024 * 1024);
        assert_eq!(config.eviction.max_ratio, 3.0);
        assert_eq!(config.eviction.inactivity_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_missing_credential_aborts() {
        let vars = [REQUIRED[0], REQUIRED[1]];
        let error = UndertowConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::MissingVariable { ref name } if name == "PROWLARR_API_KEY"
        ));
    }

    #[test]
    fn test_empty_credential_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[0] = ("TMDB_API_KEY", "  ");
        let error = UndertowConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(error.to_string().contains("TMDB_API_KEY"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "eighty"));
        let error = UndertowConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { ref name, .. } if name == "PORT"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("TORRENT_STORAGE_LIMIT_GB", "-4"));
        assert!(UndertowConfig::from_lookup(lookup(&vars)).is_err());
    }
}
