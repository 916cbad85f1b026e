//! Project and engine configuration.
//!
//! [`ProjectConfig`] is owned by the analyzed project and read from
//! `endpoint-indexer.json` or `endpoint-indexer.toml` at its root.
//! [`EngineConfig`] holds the engine's own tunables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DiscoveryError, Result};
use crate::frameworks::ScoringTable;

pub const CONFIG_FILE_JSON: &str = "endpoint-indexer.json";
pub const CONFIG_FILE_TOML: &str = "endpoint-indexer.toml";
pub const STATE_DIR: &str = ".endpoint-indexer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub version: String,
    pub base_url: Option<String>,
    /// Environment id to base URL
    pub environments: BTreeMap<String, String>,
    pub watch: WatchConfig,
    pub parser: ParserConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            base_url: None,
            environments: BTreeMap::new(),
            watch: WatchConfig::default(),
            parser: ParserConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    /// Globs relative to the project root; empty means everything
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserConfig {
    pub incremental_enabled: bool,
    /// Worker threads for full scans; `None` uses available parallelism
    pub parallelism: Option<usize>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            incremental_enabled: true,
            parallelism: None,
        }
    }
}

impl ProjectConfig {
    /// Loads the project configuration, falling back to defaults when the
    /// project has none.
    pub fn load(root: &Path) -> Result<Self> {
        match Self::locate(root) {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn locate(root: &Path) -> Option<PathBuf> {
        [CONFIG_FILE_JSON, CONFIG_FILE_TOML]
            .iter()
            .map(|name| root.join(name))
            .find(|p| p.is_file())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading project config from: {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Config(format!("{}: {}", path.display(), e)))?;

        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
        let config: Self = if is_toml {
            toml::from_str(&content)
                .map_err(|e| DiscoveryError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| DiscoveryError::Config(format!("{}: {}", path.display(), e)))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parser.parallelism == Some(0) {
            return Err(DiscoveryError::Config(
                "parser.parallelism must be at least 1".to_string(),
            ));
        }
        for pattern in self.watch.include.iter().chain(&self.watch.exclude) {
            glob::Pattern::new(pattern).map_err(|e| {
                DiscoveryError::Config(format!("invalid watch glob '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    /// Base URL for an environment, or the default base URL.
    pub fn base_url_for(&self, environment: Option<&str>) -> Option<&str> {
        environment
            .and_then(|env| self.environments.get(env))
            .or(self.base_url.as_ref())
            .map(String::as_str)
    }
}

/// Retry schedule for a failing change source.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Next delay after `current`, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.backoff_factor).round() as u64;
        std::cmp::min(Duration::from_millis(next_ms), self.max_delay)
    }
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum aggregate confidence for a framework to be reported
    pub detection_threshold: f64,
    pub scoring: ScoringTable,
    pub debounce: Duration,
    /// Wall-clock budget for matching a single file
    pub file_budget: Duration,
    pub max_file_bytes: u64,
    /// Representative files read per root by code-pattern probes
    pub probe_file_limit: usize,
    pub event_capacity: usize,
    pub retry: RetryPolicy,
    pub state_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            scoring: ScoringTable::default(),
            debounce: Duration::from_millis(150),
            file_budget: Duration::from_secs(2),
            max_file_bytes: 1024 * 1024,
            probe_file_limit: 24,
            event_capacity: 256,
            retry: RetryPolicy::default(),
            state_dir: STATE_DIR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the detection threshold, clamped to [0, 1]. Non-finite values
    /// leave the current threshold in place.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        if threshold.is_finite() {
            self.detection_threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Manifest location for a project root.
    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        root.join(&self.state_dir).join("manifest.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert!(config.parser.incremental_enabled);
    }

    #[test]
    fn test_load_json_camel_case() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_JSON),
            r#"{
                "version": "2",
                "baseUrl": "http://localhost:3000",
                "environments": { "staging": "https://staging.example.com" },
                "watch": { "include": ["src/**"], "exclude": ["**/*.test.js"] },
                "parser": { "incrementalEnabled": false, "parallelism": 2 }
            }"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.version, "2");
        assert_eq!(config.watch.include, vec!["src/**"]);
        assert!(!config.parser.incremental_enabled);
        assert_eq!(config.parser.parallelism, Some(2));
        assert_eq!(
            config.base_url_for(Some("staging")),
            Some("https://staging.example.com")
        );
        assert_eq!(config.base_url_for(Some("prod")), Some("http://localhost:3000"));
        assert_eq!(config.base_url_for(None), Some("http://localhost:3000"));
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_TOML),
            "baseUrl = \"http://127.0.0.1:8000\"\n[watch]\nexclude = [\"legacy/**\"]\n",
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://127.0.0.1:8000"));
        assert_eq!(config.watch.exclude, vec!["legacy/**"]);
        assert!(config.parser.incremental_enabled);
    }

    #[test]
    fn test_load_rejects_bad_glob() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_JSON),
            r#"{ "watch": { "include": ["src/[abc"] } }"#,
        )
        .unwrap();

        let result = ProjectConfig::load(dir.path());
        assert!(matches!(result, Err(DiscoveryError::Config(_))));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_JSON), "{ oops").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_retry_backoff_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(Duration::from_millis(100)),
            Duration::from_millis(200)
        );
        assert_eq!(
            policy.next_delay(Duration::from_secs(4)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_threshold_is_clamped_and_finite() {
        assert_eq!(EngineConfig::default().with_threshold(1.7).detection_threshold, 1.0);
        assert_eq!(EngineConfig::default().with_threshold(-2.0).detection_threshold, 0.0);
        assert_eq!(EngineConfig::default().with_threshold(f64::NAN).detection_threshold, 0.5);
        assert_eq!(
            EngineConfig::default()
                .with_threshold(0.8)
                .with_threshold(f64::INFINITY)
                .detection_threshold,
            0.8
        );
    }

    #[test]
    fn test_manifest_path() {
        let config = EngineConfig::default();
        assert_eq!(
            config.manifest_path(Path::new("/proj")),
            PathBuf::from("/proj/.endpoint-indexer/manifest.json")
        );
    }
}
