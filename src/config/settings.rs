//! TOML-based configuration for the ontology engine.
//!
//! Supports a config file (ontology.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [store]
//! path = "~/.ontology/store.db"
//!
//! [datasources.shop]
//! driver = "sqlite"
//! connection_string = "${SHOP_DB_PATH}"
//! project = "6f1c2a3e-0b7d-4e5f-9a8b-1c2d3e4f5a6b"
//!
//! [discovery]
//! legacy_pattern_matching = false
//! min_distinct_count = 20
//! min_cardinality_ratio = 0.05
//! max_reverse_orphan_ratio = 0.5
//! high_confidence_fk = 0.8
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::discovery::thresholds;
use crate::discovery::{AcceptanceConfig, CandidateConfig};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Datasource not found: {0}")]
    DatasourceNotFound(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Relationship store location.
    pub store: StoreSettings,

    /// Named datasources.
    pub datasources: HashMap<String, DatasourceSettings>,

    /// Discovery thresholds.
    pub discovery: DiscoverySettings,
}

/// Supported datasource drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Driver::Sqlite),
            _ => None,
        }
    }
}

/// Datasource configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceSettings {
    /// Database driver (sqlite).
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,

    /// Project the datasource belongs to.
    #[serde(default)]
    pub project: Option<Uuid>,
}

impl DatasourceSettings {
    /// Get the driver type.
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        Driver::parse(&self.driver)
            .ok_or_else(|| SettingsError::UnsupportedDriver(self.driver.clone()))
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }

    /// Project id, or the nil project when none is configured.
    pub fn project_id(&self) -> Uuid {
        self.project.unwrap_or_else(Uuid::nil)
    }
}

/// Store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the store database (defaults to `~/.ontology/store.db`).
    pub path: Option<String>,
}

impl StoreSettings {
    /// Store path with environment variables and a leading `~` expanded.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        let Some(raw) = &self.path else {
            let home = dirs::home_dir().ok_or_else(|| {
                SettingsError::InvalidConfig("cannot determine home directory".to_string())
            })?;
            return Ok(home.join(".ontology").join("store.db"));
        };

        let expanded = expand_env_vars(raw)?;
        match expanded.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    SettingsError::InvalidConfig("cannot determine home directory".to_string())
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(expanded)),
        }
    }
}

/// Discovery thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Legacy mode recorded for a project the first time it is discovered.
    pub legacy_pattern_matching: bool,

    /// Distinct-count floor for FK candidates.
    pub min_distinct_count: i64,

    /// Minimum distinct/row ratio for FK candidates.
    pub min_cardinality_ratio: f64,

    /// Maximum share of target rows a match may leave unreferenced.
    pub max_reverse_orphan_ratio: f64,

    /// Upstream FK confidence above which pk matching skips a column.
    pub high_confidence_fk: f64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            legacy_pattern_matching: false,
            min_distinct_count: thresholds::candidate::MIN_DISTINCT_COUNT,
            min_cardinality_ratio: thresholds::candidate::MIN_CARDINALITY_RATIO,
            max_reverse_orphan_ratio: thresholds::acceptance::MAX_REVERSE_ORPHAN_RATIO,
            high_confidence_fk: thresholds::candidate::HIGH_CONFIDENCE_FK,
        }
    }
}

impl DiscoverySettings {
    /// Candidate thresholds. The legacy flag comes from project settings at
    /// run time.
    pub fn candidate_config(&self) -> CandidateConfig {
        CandidateConfig {
            min_distinct_count: self.min_distinct_count,
            min_cardinality_ratio: self.min_cardinality_ratio,
            high_confidence_fk: self.high_confidence_fk,
            ..CandidateConfig::default()
        }
    }

    pub fn acceptance_config(&self) -> AcceptanceConfig {
        AcceptanceConfig {
            max_reverse_orphan_ratio: self.max_reverse_orphan_ratio,
            ..AcceptanceConfig::default()
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let ratios = [
            ("min_cardinality_ratio", self.min_cardinality_ratio),
            ("max_reverse_orphan_ratio", self.max_reverse_orphan_ratio),
            ("high_confidence_fk", self.high_confidence_fk),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::InvalidConfig(format!(
                    "discovery.{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.min_distinct_count < 0 {
            return Err(SettingsError::InvalidConfig(
                "discovery.min_distinct_count must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.discovery.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `ONTOLOGY_CONFIG`
    /// 2. `./ontology.toml`
    /// 3. `~/.config/ontology/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("ONTOLOGY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("ontology.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ontology").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a datasource by name.
    pub fn get_datasource(&self, name: &str) -> Result<&DatasourceSettings, SettingsError> {
        self.datasources
            .get(name)
            .ok_or_else(|| SettingsError::DatasourceNotFound(name.to_string()))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        if chars.next_if_eq(&'{').is_some() {
            let mut var_name = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }
            if !closed {
                return Err(SettingsError::InvalidConfig(format!(
                    "unterminated variable reference in '{}'",
                    s
                )));
            }
            let value =
                env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
            result.push_str(&value);
        } else {
            // $VAR ends at the first non-alphanumeric, non-underscore char
            let mut var_name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                result.push('$');
            } else {
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            }
        }
    }

    Ok(result)
}
