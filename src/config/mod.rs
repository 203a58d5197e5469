//! Configuration management.
//!
//! Configuration comes from environment variables, optionally layered over a
//! TOML file. Environment variables always win.
//!
//! | Variable | Required | Default |
//! |----------|----------|---------|
//! | `AZURE_DIGITAL_TWINS_URL` | yes | - |
//! | `AZURE_TENANT_ID` | yes | - |
//! | `AZURE_CLIENT_ID` | yes | - |
//! | `AZURE_CLIENT_SECRET` | yes | - |
//! | `AZURE_AUTHORITY_HOST` | no | `https://login.microsoftonline.com` |
//! | `TWIN_CACHE_HOST` | yes | - |
//! | `TWIN_CACHE_PORT` | yes | - |
//! | `TWIN_CACHE_NAME` | yes | - |
//! | `TWIN_CACHE_PASSWORD` | no | none |
//! | `TWIN_CACHE_STRATEGY` | no | `bulk` |
//! | `TWIN_CACHE_ROTATION` | no | 3 (`bulk`), 1 (`direct`) |
//! | `TWIN_CACHE_SCRATCH_DIR` | no | system temp dir |
//! | `TWIN_CACHE_BATCH_SIZE` | no | 500 |
//! | `LOG_LEVEL` | no | `info` |
//! | `LOG_FORMAT` | no | `pretty` |
//! | `LOG_FILE` | no | stdout |
//! | `TWIN_CACHE_METRICS_PUSH_GATEWAY` | no | disabled |

use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Keys that must be present for a run.
pub const REQUIRED_KEYS: [&str; 7] = [
    "AZURE_CLIENT_ID",
    "AZURE_TENANT_ID",
    "AZURE_CLIENT_SECRET",
    "AZURE_DIGITAL_TWINS_URL",
    "TWIN_CACHE_HOST",
    "TWIN_CACHE_PORT",
    "TWIN_CACHE_NAME",
];

/// Default Entra ID authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default number of rows per bulk statement.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// How projected rows reach the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreStrategy {
    /// Stage CSV artifacts, then bulk load them (live-to-bulk-files).
    #[default]
    BulkLoad,
    /// One write statement per record (live-to-live-store).
    DirectQuery,
}

impl StoreStrategy {
    /// Number of generations kept when no rotation is configured.
    #[must_use]
    pub const fn default_rotation(&self) -> u32 {
        match self {
            Self::BulkLoad => 3,
            Self::DirectQuery => 1,
        }
    }

    /// Returns the strategy as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BulkLoad => "bulk",
            Self::DirectQuery => "direct",
        }
    }
}

impl FromStr for StoreStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bulk" | "bulk-load" | "bulk_load" | "csv" => Ok(Self::BulkLoad),
            "direct" | "direct-query" | "direct_query" | "query" => Ok(Self::DirectQuery),
            other => Err(Error::Config(format!("unknown store strategy: {other}"))),
        }
    }
}

/// Azure Digital Twins source settings.
#[derive(Debug, Clone)]
pub struct AdtSourceConfig {
    /// Instance URL, e.g. `https://my-instance.api.weu.digitaltwins.azure.net`.
    pub url: String,
    /// Entra ID tenant.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: SecretString,
    /// Authority host used for token requests.
    pub authority_host: String,
}

/// Twin cache connection settings.
#[derive(Debug, Clone)]
pub struct TwinCacheConfig {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Graph name; generations are stored as `{name}:{version}`.
    pub name: String,
    /// Optional password.
    pub password: Option<SecretString>,
    /// Number of generations to keep (0 replaces the graph in place).
    pub rotation: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Filter directive (`info`, `adt_twincache=debug`, ...).
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

/// Metrics push gateway settings.
#[derive(Debug, Clone, Default)]
pub struct MetricsSettings {
    /// Push gateway endpoint; metrics are disabled when absent.
    pub push_gateway: Option<String>,
    /// Optional basic auth user.
    pub username: Option<String>,
    /// Optional basic auth password.
    pub password: Option<String>,
}

/// Validated configuration for a run.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Twin graph source.
    pub adt: AdtSourceConfig,
    /// Target cache.
    pub cache: TwinCacheConfig,
    /// Store strategy.
    pub strategy: StoreStrategy,
    /// Directory for staged artifacts.
    pub scratch_dir: PathBuf,
    /// Rows per bulk statement.
    pub batch_size: usize,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
    /// Whether `TWIN_CACHE_ROTATION` was set rather than defaulted.
    pub rotation_explicit: bool,
}

impl ConnectorConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every missing key, or naming the
    /// first malformed value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from a TOML file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the merged
    /// configuration is incomplete.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_values = match path {
            Some(path) => ConfigFile::load(path)?.into_pairs(),
            None => HashMap::new(),
        };
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_values.get(key).cloned())
        })
    }

    /// Builds configuration from a key lookup.
    ///
    /// Blank values count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every missing key, or naming the
    /// first malformed value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing = missing_keys(&get);
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing environment variables: {}",
                missing.join(", ")
            )));
        }
        let required = |key: &str| get(key).ok_or_else(|| Error::Config(format!("missing {key}")));

        let strategy = get("TWIN_CACHE_STRATEGY")
            .map(|s| s.parse::<StoreStrategy>())
            .transpose()?
            .unwrap_or_default();
        let explicit_rotation =
            parse_number::<u32>("TWIN_CACHE_ROTATION", get("TWIN_CACHE_ROTATION"))?;
        let rotation = explicit_rotation.unwrap_or_else(|| strategy.default_rotation());
        let port = parse_number::<u16>("TWIN_CACHE_PORT", get("TWIN_CACHE_PORT"))?
            .ok_or_else(|| Error::Config("missing TWIN_CACHE_PORT".to_string()))?;
        let batch_size = parse_number::<usize>("TWIN_CACHE_BATCH_SIZE", get("TWIN_CACHE_BATCH_SIZE"))?
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .max(1);

        Ok(Self {
            adt: AdtSourceConfig {
                url: required("AZURE_DIGITAL_TWINS_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                tenant_id: required("AZURE_TENANT_ID")?,
                client_id: required("AZURE_CLIENT_ID")?,
                client_secret: SecretString::from(required("AZURE_CLIENT_SECRET")?),
                authority_host: get("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            },
            cache: TwinCacheConfig {
                host: required("TWIN_CACHE_HOST")?,
                port,
                name: required("TWIN_CACHE_NAME")?,
                password: get("TWIN_CACHE_PASSWORD").map(SecretString::from),
                rotation,
            },
            strategy,
            scratch_dir: get("TWIN_CACHE_SCRATCH_DIR")
                .map_or_else(|| std::env::temp_dir().join("adt-twincache"), PathBuf::from),
            batch_size,
            logging: LoggingSettings {
                level: get("LOG_LEVEL"),
                format: get("LOG_FORMAT"),
                file: get("LOG_FILE").map(PathBuf::from),
            },
            metrics: MetricsSettings {
                push_gateway: get("TWIN_CACHE_METRICS_PUSH_GATEWAY"),
                username: get("TWIN_CACHE_METRICS_PUSH_GATEWAY_USERNAME"),
                password: get("TWIN_CACHE_METRICS_PUSH_GATEWAY_PASSWORD"),
            },
            rotation_explicit: explicit_rotation.is_some(),
        })
    }

    /// Overrides the store strategy.
    ///
    /// Unless a rotation was configured explicitly, the rotation follows the
    /// new strategy's default.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StoreStrategy) -> Self {
        self.strategy = strategy;
        if !self.rotation_explicit {
            self.cache.rotation = strategy.default_rotation();
        }
        self
    }
}

/// Returns the required keys that the lookup does not provide.
pub fn missing_keys<F>(lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| lookup(*key).is_none_or(|v| v.trim().is_empty()))
        .collect()
}

fn parse_number<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::Config(format!("{key} is not a valid number: {v}")))
        })
        .transpose()
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Source section.
    pub adt: Option<ConfigFileAdt>,
    /// Cache section.
    pub cache: Option<ConfigFileCache>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Metrics section.
    pub metrics: Option<ConfigFileMetrics>,
}

/// `[adt]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAdt {
    /// Instance URL.
    pub url: Option<String>,
    /// Tenant.
    pub tenant_id: Option<String>,
    /// Client ID.
    pub client_id: Option<String>,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Authority host.
    pub authority_host: Option<String>,
}

/// `[cache]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCache {
    /// Host.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Graph name.
    pub name: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Rotation count.
    pub rotation: Option<u32>,
    /// `bulk` or `direct`.
    pub strategy: Option<String>,
    /// Scratch directory.
    pub scratch_dir: Option<String>,
    /// Rows per bulk statement.
    pub batch_size: Option<usize>,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// `[metrics]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMetrics {
    /// Push gateway endpoint.
    pub push_gateway: Option<String>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
}

impl ConfigFile {
    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })
    }

    /// Flattens the file into environment-variable keyed values.
    #[must_use]
    pub fn into_pairs(self) -> HashMap<String, String> {
        let mut pairs = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.insert(key.to_string(), value);
            }
        };

        if let Some(adt) = self.adt {
            put("AZURE_DIGITAL_TWINS_URL", adt.url);
            put("AZURE_TENANT_ID", adt.tenant_id);
            put("AZURE_CLIENT_ID", adt.client_id);
            put("AZURE_CLIENT_SECRET", adt.client_secret);
            put("AZURE_AUTHORITY_HOST", adt.authority_host);
        }
        if let Some(cache) = self.cache {
            put("TWIN_CACHE_HOST", cache.host);
            put("TWIN_CACHE_PORT", cache.port.map(|p| p.to_string()));
            put("TWIN_CACHE_NAME", cache.name);
            put("TWIN_CACHE_PASSWORD", cache.password);
            put("TWIN_CACHE_ROTATION", cache.rotation.map(|r| r.to_string()));
            put("TWIN_CACHE_STRATEGY", cache.strategy);
            put("TWIN_CACHE_SCRATCH_DIR", cache.scratch_dir);
            put("TWIN_CACHE_BATCH_SIZE", cache.batch_size.map(|b| b.to_string()));
        }
        if let Some(logging) = self.logging {
            put("LOG_LEVEL", logging.level);
            put("LOG_FORMAT", logging.format);
            put("LOG_FILE", logging.file);
        }
        if let Some(metrics) = self.metrics {
            put("TWIN_CACHE_METRICS_PUSH_GATEWAY", metrics.push_gateway);
            put("TWIN_CACHE_METRICS_PUSH_GATEWAY_USERNAME", metrics.username);
            put("TWIN_CACHE_METRICS_PUSH_GATEWAY_PASSWORD", metrics.password);
        }
        pairs
    }
}
