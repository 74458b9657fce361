use crate::core::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of rows a cursor fetches per round trip.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub connection: ConnectionConfig,
    pub reader: ReaderConfig,
    pub reconcile: ReconcileConfig,
}

/// Settings applied to every physical connection when it is opened.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Create the database file when the host does not exist yet
    pub create_if_missing: bool,
    /// Busy timeout; `None` leaves the driver default in place
    pub busy_timeout_ms: Option<u64>,
    pub foreign_keys: bool,
    pub journal_mode: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            create_if_missing: false,
            busy_timeout_ms: None,
            foreign_keys: true,
            journal_mode: None,
        }
    }
}

impl ConnectionConfig {
    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }
}

/// Reader-mode (cursor) configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub page_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Which original values the reconciler's UPDATE/DELETE predicates compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    /// Every mapped column must still hold the value it had at fetch time
    #[default]
    CompareAllValues,
    /// Only the primary key is compared; last writer wins
    KeyOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub conflict: ConflictMode,
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = datagate::config::load_config("datagate.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GatewayConfig> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Location of the per-user configuration file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("datagate").join("config.toml"))
}

/// Loads the per-user configuration, falling back to defaults when absent.
pub fn load_default_config() -> Result<GatewayConfig> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(path),
        _ => Ok(GatewayConfig::default()),
    }
}

impl GatewayConfig {
    fn validate(&self) -> Result<()> {
        if self.reader.page_size == 0 {
            return Err(crate::core::GatewayError::Config(
                "reader.page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
