//! Configuration module for the ontology engine.
//!
//! Handles the TOML config file, environment variables, and discovery
//! thresholds.

mod settings;

pub use settings::{
    expand_env_vars, DatasourceSettings, DiscoverySettings, Driver, Settings, SettingsError,
    StoreSettings,
};
