//! User configuration file
//!
//! Read from `$KUBELOGS_CONFIG`, or `~/.kubelogs/config.toml` when unset.
//! Command line flags override every value found here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use kubelogs_types::DefaultContainers;

const CONFIG_ENV: &str = "KUBELOGS_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub max_log_requests: usize,
    pub pod_running_timeout_secs: u64,
    pub default_containers: DefaultContainers,
    pub prefix: bool,
    pub ignore_errors: bool,
    pub timestamps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: None,
            namespace: None,
            max_log_requests: 5,
            pod_running_timeout_secs: 20,
            default_containers: DefaultContainers::All,
            prefix: false,
            ignore_errors: false,
            timestamps: false,
        }
    }
}

impl Config {
    fn path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let home = dirs::home_dir()?;
        Some(home.join(".kubelogs").join("config.toml"))
    }

    /// Load the configuration; a missing file yields the defaults
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn pod_running_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_running_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_all_keys() {
        let config = Config::parse(
            r#"
            context = "staging"
            namespace = "shop"
            max-log-requests = 12
            pod-running-timeout-secs = 45
            default-containers = "first"
            prefix = true
            ignore-errors = true
            timestamps = true
            "#,
        )
        .unwrap();
        assert_eq!(config.context.as_deref(), Some("staging"));
        assert_eq!(config.namespace.as_deref(), Some("shop"));
        assert_eq!(config.max_log_requests, 12);
        assert_eq!(config.pod_running_timeout(), Duration::from_secs(45));
        assert_eq!(config.default_containers, DefaultContainers::First);
        assert!(config.prefix && config.ignore_errors && config.timestamps);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::parse("prefix = true").unwrap();
        assert!(config.prefix);
        assert_eq!(config.max_log_requests, 5);
        assert_eq!(config.default_containers, DefaultContainers::All);
    }

    #[test]
    fn test_malformed_config_is_error() {
        assert!(Config::parse("max-log-requests = \"many\"").is_err());
        assert!(Config::parse("unknown-key = 1").is_err());
        assert!(Config::parse("prefix = ").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("kubelogs-test-does-not-exist/config.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }
}
