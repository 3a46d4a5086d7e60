//! Board configuration: an optional YAML file overridden by environment variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use board_remote::ServerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, BoardResult};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "application.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceControlConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_interval_secs: u64,
    /// Lower-cased project keys to track; every project when unset.
    pub projects: Option<Vec<String>>,
    /// Pagination ceiling per refresh pass.
    pub max_pages: u32,
    pub page_limit: u32,
}

impl Default for SourceControlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            refresh_interval_secs: 60,
            projects: None,
            max_pages: 20,
            page_limit: 25,
        }
    }
}

impl SourceControlConfig {
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Re-poll of unfinished builds and the build-listing seed.
    pub refresh_interval_secs: u64,
    /// Authoritative refresh of every branch and pull request.
    pub full_refresh_interval_secs: u64,
    /// Build server per project id.
    pub servers: BTreeMap<String, ServerConfig>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            full_refresh_interval_secs: 300,
            servers: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn full_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.full_refresh_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseConfig {
    pub tick_interval_secs: u64,
    pub max_stage_retries: u32,
    pub max_build_restarts: u32,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            max_stage_retries: 5,
            max_build_restarts: 5,
        }
    }
}

impl ReleaseConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// `mem://`, `surrealkv://<path>` or `ws://<host>`; in-memory store when unset.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardConfig {
    pub source_control: SourceControlConfig,
    pub build: BuildConfig,
    pub release: ReleaseConfig,
    pub server: ServerSettings,
    pub store: StoreConfig,
}

impl BoardConfig {
    pub fn from_yaml(text: &str) -> BoardResult<Self> {
        serde_yaml::from_str(text).map_err(|e| BoardError::Config(format!("invalid YAML: {e}")))
    }

    /// Read `path` when it exists, otherwise start from the defaults.
    pub fn from_file(path: &Path) -> BoardResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| BoardError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// File (when present), then process environment, then validation.
    pub fn load(path: &Path) -> BoardResult<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_from(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `BOARD_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BOARD_SC_URL") {
            self.source_control.url = url;
        }
        if let Some(username) = lookup("BOARD_SC_USERNAME") {
            self.source_control.username = Some(username);
        }
        if let Some(password) = lookup("BOARD_SC_PASSWORD") {
            self.source_control.password = Some(password);
        }
        if let Some(projects) = lookup("BOARD_SC_PROJECTS") {
            let keys: Vec<String> = projects
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
            self.source_control.projects = (!keys.is_empty()).then_some(keys);
        }
        if let Some(secs) = lookup("BOARD_SC_REFRESH_SECS").and_then(|s| s.parse().ok()) {
            self.source_control.refresh_interval_secs = secs;
        }
        if let Some(port) = lookup("BOARD_PORT").and_then(|s| s.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("BOARD_STORE_URL") {
            self.store.url = (!url.is_empty()).then_some(url);
        }
    }

    /// Startup checks. Missing credentials only warn.
    pub fn validate(&self) -> BoardResult<()> {
        if self.source_control.url.trim().is_empty() {
            return Err(BoardError::Config(
                "source-control url is required (sourceControl.url or BOARD_SC_URL)".to_string(),
            ));
        }
        if self.source_control.max_pages == 0 {
            return Err(BoardError::Config(
                "sourceControl.maxPages must be at least 1".to_string(),
            ));
        }
        if self.source_control.page_limit == 0 {
            return Err(BoardError::Config(
                "sourceControl.pageLimit must be at least 1".to_string(),
            ));
        }
        if self.source_control.username.is_none() {
            tracing::warn!("BOARD_SC_USERNAME not set -- source-control calls are anonymous");
        }
        for (project, server) in &self.build.servers {
            if server.username.is_none() {
                tracing::warn!(project_id = %project, "Build server has no credentials");
            }
        }
        Ok(())
    }

    /// Configured allowlist, lower-cased.
    pub fn project_allowlist(&self) -> Option<Vec<String>> {
        self.source_control
            .projects
            .as_ref()
            .map(|p| p.iter().map(|k| k.to_lowercase()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
sourceControl:
  url: https://bitbucket.example.com
  username: bot
  password: secret
  projects: [MXTS]
build:
  fullRefreshIntervalSecs: 600
  servers:
    mxts: { url: https://jenkins.example.com, username: bot, password: secret }
server:
  port: 8080
"#;

    #[test]
    fn test_yaml_fills_defaults() {
        let config = BoardConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.source_control.refresh_interval_secs, 60);
        assert_eq!(config.source_control.max_pages, 20);
        assert_eq!(config.build.refresh_interval_secs, 60);
        assert_eq!(config.build.full_refresh_interval_secs, 600);
        assert_eq!(config.release.tick_interval_secs, 5);
        assert_eq!(config.release.max_stage_retries, 5);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.url, None);
        assert_eq!(config.project_allowlist(), Some(vec!["mxts".to_string()]));
        assert_eq!(
            config.build.servers["mxts"].url,
            "https://jenkins.example.com"
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = BoardConfig::from_yaml(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            ("BOARD_SC_URL", "https://scm.internal"),
            ("BOARD_SC_PROJECTS", "Alpha, beta,,"),
            ("BOARD_PORT", "9000"),
            ("BOARD_STORE_URL", "mem://"),
            ("BOARD_SC_REFRESH_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.source_control.url, "https://scm.internal");
        assert_eq!(
            config.source_control.projects,
            Some(vec!["alpha".to_string(), "beta".to_string()])
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.store.url.as_deref(), Some("mem://"));
        assert_eq!(config.source_control.refresh_interval_secs, 60);
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let err = BoardConfig::default().validate().unwrap_err();
        assert!(matches!(err, BoardError::Config(_)));
    }

    #[test]
    fn test_zero_page_settings_are_config_errors() {
        let yaml = SAMPLE.replace("  projects: [MXTS]", "  projects: [MXTS]\n  maxPages: 0");
        let config = BoardConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.source_control.max_pages, 0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BoardError::Config(ref m) if m.contains("maxPages")));

        let mut config = BoardConfig::from_yaml(SAMPLE).unwrap();
        config.source_control.page_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BoardError::Config(ref m) if m.contains("pageLimit")));
    }

    #[test]
    fn test_from_file_reads_yaml_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = BoardConfig::from_file(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(missing, BoardConfig::default());

        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, SAMPLE).unwrap();
        let loaded = BoardConfig::from_file(&path).unwrap();
        assert_eq!(loaded.source_control.username.as_deref(), Some("bot"));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = BoardConfig::from_yaml("sourceControl: [").unwrap_err();
        assert!(matches!(err, BoardError::Config(_)));
    }
}
