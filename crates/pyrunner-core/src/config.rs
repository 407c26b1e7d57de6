use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Wall-clock budget for a single script execution.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 3600;
/// Wall-clock budget for `pip install -r requirements.txt`.
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 300;
/// Maximum characters stored in a run record's message.
pub const DEFAULT_MESSAGE_CAP: usize = 3000;
pub const DEFAULT_ENTRY_POINT: &str = "main.py";
pub const DEFAULT_MANIFEST: &str = "requirements.txt";
/// Alias under which the primary database is registered.
pub const DEFAULT_DB_ALIAS: &str = "default";

/// Top-level config (pyrunner.toml + PYRUNNER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PyrunnerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Primary database, registered under the `default` alias.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Extra databases a job may be routed to via its `db_alias`.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            aliases: HashMap::new(),
        }
    }
}

/// Budgets and file-name conventions for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
    #[serde(default = "default_message_cap")]
    pub message_cap: usize,
    /// File name searched for (recursively) under the extracted source root.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Dependency manifest expected at the source root.
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            install_timeout_secs: DEFAULT_INSTALL_TIMEOUT_SECS,
            message_cap: DEFAULT_MESSAGE_CAP,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            manifest: DEFAULT_MANIFEST.to_string(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_exec_timeout() -> u64 {
    DEFAULT_EXEC_TIMEOUT_SECS
}
fn default_install_timeout() -> u64 {
    DEFAULT_INSTALL_TIMEOUT_SECS
}
fn default_message_cap() -> usize {
    DEFAULT_MESSAGE_CAP
}
fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}
fn default_manifest() -> String {
    DEFAULT_MANIFEST.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pyrunner/pyrunner.db", home)
}

impl PyrunnerConfig {
    /// Load config from a TOML file with PYRUNNER_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `PYRUNNER_EXECUTION__EXEC_TIMEOUT_SECS=600`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.pyrunner/pyrunner.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PyrunnerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PYRUNNER_").split("__"))
            .extract()
            .map_err(|e| crate::error::PyrunnerError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pyrunner/pyrunner.toml", home)
}
