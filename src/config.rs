//! `board.toml` configuration.
//!
//! Resolution order, later wins: built-in defaults, the first config file
//! found (`--config`, then `.rmw/board.toml`, then the user config dir),
//! environment variables (`.env` is loaded first), then CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

pub const CONFIG_FILE: &str = "board.toml";
pub const PROJECT_DIR: &str = ".rmw";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Bind on all interfaces and allow any CORS origin.
    #[serde(default)]
    pub dev_mode: bool,
    /// Events buffered per change feed subscriber before it lags.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_port() -> u16 {
    3142
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".rmw/board.db")
}

fn default_feed_capacity() -> usize {
    256
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
            feed_capacity: default_feed_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3142".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Values pre-filled into a submission when the flag is omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsSection {
    #[serde(default = "default_department")]
    pub department: String,
    #[serde(default = "default_requested_by")]
    pub requested_by: String,
}

fn default_department() -> String {
    "RMW".to_string()
}

fn default_requested_by() -> String {
    "Line Operator".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            department: default_department(),
            requested_by: default_requested_by(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Directory for daily-rolling log files. Stderr only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
            dir: None,
        }
    }
}

/// The complete board.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BoardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BoardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse board.toml")
    }

    /// Load from the first existing candidate path, or defaults.
    pub fn load_or_default(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        for candidate in Self::search_paths(project_dir) {
            if candidate.exists() {
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn search_paths(project_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![project_dir.join(PROJECT_DIR).join(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("rmw-board").join(CONFIG_FILE));
        }
        paths
    }

    /// Load `.env` and the environment on top of the file configuration.
    pub fn resolve(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        let mut config = Self::load_or_default(explicit, project_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `RMW_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("RMW_SERVER_URL") {
            self.client.base_url = url;
        }
        if let Some(port) = lookup("RMW_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid RMW_PORT: {}", port))?;
        }
        if let Some(path) = lookup("RMW_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(format) = lookup("RMW_LOG_FORMAT") {
            self.logging.format = format.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize board.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.server.feed_capacity == 0 {
            warnings.push("server.feed_capacity must be at least 1".to_string());
        }
        if self.client.timeout_secs == 0 {
            warnings.push("client.timeout_secs of 0 disables every request".to_string());
        }
        if !self.client.base_url.starts_with("http://")
            && !self.client.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "client.base_url '{}' should start with http:// or https://",
                self.client.base_url
            ));
        }
        if self.defaults.department.trim().is_empty() {
            warnings.push("defaults.department is empty".to_string());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::default();
        assert_eq!(config.server.port, 3142);
        assert_eq!(config.server.db_path, PathBuf::from(".rmw/board.db"));
        assert_eq!(config.server.feed_capacity, 256);
        assert_eq!(config.client.base_url, "http://127.0.0.1:3142");
        assert_eq!(config.client.timeout_secs, 10);
        assert_eq!(config.defaults.department, "RMW");
        assert_eq!(config.defaults.requested_by, "Line Operator");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = BoardConfig::parse(
            r#"
[server]
port = 8080

[logging]
format = "json"
dir = "/var/log/rmw"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.db_path, PathBuf::from(".rmw/board.db"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/rmw")));
        assert_eq!(config.defaults.department, "RMW");
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(BoardConfig::parse("[server\nport = 1").is_err());
        assert!(BoardConfig::parse("[logging]\nformat = \"xml\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RMW_SERVER_URL", "http://board.local:9000"),
            ("RMW_PORT", "9000"),
            ("RMW_DB_PATH", "/tmp/board.db"),
            ("RMW_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();
        let mut config = BoardConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.client.base_url, "http://board.local:9000");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/board.db"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = BoardConfig::default();
        let err = config
            .apply_env(|k| (k == "RMW_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid RMW_PORT"));
    }

    #[test]
    fn test_load_or_default_prefers_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = BoardConfig::load_or_default(None, dir.path()).unwrap();
        assert_eq!(missing.server.port, BoardConfig::default().server.port);

        let mut config = BoardConfig::default();
        config.defaults.department = "Cutting".into();
        config
            .save(&dir.path().join(PROJECT_DIR).join(CONFIG_FILE))
            .unwrap();

        let loaded = BoardConfig::load_or_default(None, dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = BoardConfig::load_or_default(Some(&dir.path().join("nope.toml")), dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut config = BoardConfig::default();
        config.server.feed_capacity = 0;
        config.client.base_url = "board.local".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }
}
