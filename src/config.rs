//! Configuration management for casedocs using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contexts::PageConfig;
use crate::scrapers::ClientOptions;
use crate::services::download::DownloadConfig;
use crate::services::enrich::EnrichConfig;
use crate::utils::DateSeparator;

/// Environment variable holding the site session cookie.
pub const COOKIE_ENV: &str = "CASEDOCS_COOKIE";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory case folders are created in.
    pub output_dir: PathBuf,
    /// Prefix of the case root directory (`<prefix>-cases`).
    pub site_prefix: String,
    /// Separator for dates rewritten to `YYYY-MM-DD` form.
    pub date_separator: DateSeparator,
    /// User agent: `None` = default, `"browser"` = desktop browser, else custom.
    pub user_agent: Option<String>,
    /// Raw `Cookie` header for the site session.
    pub cookie: Option<String>,
    /// Page fetch and probe timeout in seconds.
    pub request_timeout: u64,
    /// Per-document download timeout in seconds.
    pub download_timeout: u64,
    /// Request/response timeout between contexts in seconds.
    pub channel_timeout: u64,
    /// Delay between metadata probes in milliseconds.
    pub probe_delay_ms: u64,
    /// Forget completed downloads once they finish.
    pub erase_completed: bool,
    /// Log where the index page was saved.
    pub reveal_index: bool,
    /// One directory per event instead of a flat case folder.
    pub use_subdirectories: bool,
    /// Redirect targets that mean the session has expired.
    pub login_markers: Vec<String>,
    pub stylesheet_name: String,
    pub index_filename: String,
    /// Substring of the href linking a case to its documents page.
    pub case_documents_link_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        // Downloads dir -> Home dir -> Current dir
        let output_dir = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            output_dir,
            site_prefix: "oesi".to_string(),
            date_separator: DateSeparator::Dash,
            user_agent: None,
            cookie: std::env::var(COOKIE_ENV).ok().filter(|c| !c.is_empty()),
            request_timeout: 30,
            download_timeout: 300,
            channel_timeout: 600,
            probe_delay_ms: 300,
            erase_completed: true,
            reveal_index: true,
            use_subdirectories: true,
            login_markers: EnrichConfig::default().login_markers,
            stylesheet_name: "PublicAccess.css".to_string(),
            index_filename: "index.html".to_string(),
            case_documents_link_pattern: "CaseDocuments".to_string(),
        }
    }
}

impl Settings {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.request_timeout),
            user_agent: self.user_agent.clone(),
            cookie: self.cookie.clone(),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout)
    }

    pub fn enrich_config(&self) -> EnrichConfig {
        EnrichConfig {
            probe_delay: Duration::from_millis(self.probe_delay_ms),
            login_markers: self.login_markers.clone(),
        }
    }

    pub fn page_config(&self) -> PageConfig {
        PageConfig {
            date_separator: self.date_separator,
            stylesheet_name: self.stylesheet_name.clone(),
            case_documents_link_pattern: self.case_documents_link_pattern.clone(),
            enrich: self.enrich_config(),
        }
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            site_prefix: self.site_prefix.clone(),
            use_subdirectories: self.use_subdirectories,
            erase_completed: self.erase_completed,
            reveal_index: self.reveal_index,
            stylesheet_name: self.stylesheet_name.clone(),
            index_filename: self.index_filename.clone(),
        }
    }

    /// Ensure the output directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid date separator {0:?} (use dash or underscore)")]
    DateSeparator(String),
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_prefix: Option<String>,
    /// `dash` or `underscore`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_separator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erase_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_subdirectories: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_markers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stylesheet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_documents_link_pattern: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers casedocs config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("casedocs").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };

        debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(
        &self,
        settings: &mut Settings,
        base_dir: &Path,
    ) -> Result<(), ConfigError> {
        if let Some(ref output_dir) = self.output_dir {
            settings.output_dir = self.resolve_path(output_dir, base_dir);
        }
        if let Some(ref prefix) = self.site_prefix {
            settings.site_prefix = prefix.clone();
        }
        if let Some(ref separator) = self.date_separator {
            settings.date_separator = separator
                .parse()
                .map_err(|_| ConfigError::DateSeparator(separator.clone()))?;
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        // The environment wins over a cookie saved in the file.
        if settings.cookie.is_none() {
            settings.cookie = self.cookie.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(timeout) = self.download_timeout {
            settings.download_timeout = timeout;
        }
        if let Some(timeout) = self.channel_timeout {
            settings.channel_timeout = timeout;
        }
        if let Some(delay) = self.probe_delay_ms {
            settings.probe_delay_ms = delay;
        }
        if let Some(erase) = self.erase_completed {
            settings.erase_completed = erase;
        }
        if let Some(reveal) = self.reveal_index {
            settings.reveal_index = reveal;
        }
        if let Some(subdirs) = self.use_subdirectories {
            settings.use_subdirectories = subdirs;
        }
        if let Some(ref markers) = self.login_markers {
            settings.login_markers = markers.clone();
        }
        if let Some(ref name) = self.stylesheet_name {
            settings.stylesheet_name = name.clone();
        }
        if let Some(ref name) = self.index_filename {
            settings.index_filename = name.clone();
        }
        if let Some(ref pattern) = self.case_documents_link_pattern {
            settings.case_documents_link_pattern = pattern.clone();
        }
        Ok(())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (--config flag).
    pub config_path: Option<PathBuf>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    // An explicit --config must load; discovery failures fall back to defaults.
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    config.apply_to_settings(&mut settings, &base_dir)?;
    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("casedocs.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "cases"
site_prefix = "nh"
date_separator = "underscore"
probe_delay_ms = 0
use_subdirectories = false
login_markers = ["signin"]
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config
            .apply_to_settings(&mut settings, &config.base_dir().unwrap())
            .unwrap();

        assert_eq!(settings.output_dir, dir.path().join("cases"));
        assert_eq!(settings.site_prefix, "nh");
        assert_eq!(settings.date_separator, DateSeparator::Underscore);
        assert_eq!(settings.probe_delay_ms, 0);
        assert!(!settings.use_subdirectories);
        assert_eq!(settings.login_markers, vec!["signin".to_string()]);
        // Untouched values keep their defaults.
        assert_eq!(settings.index_filename, "index.html");
        assert!(settings.erase_completed);
    }

    #[tokio::test]
    async fn test_load_yaml_and_json_config() {
        let dir = TempDir::new().unwrap();

        let yaml = dir.path().join("casedocs.yaml");
        std::fs::write(&yaml, "site_prefix: vt\nerase_completed: false\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.site_prefix.as_deref(), Some("vt"));
        assert_eq!(config.erase_completed, Some(false));

        let json = dir.path().join("casedocs.json");
        std::fs::write(&json, r#"{"target": "/srv/cases"}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.output_dir.as_deref(), Some("/srv/cases"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("casedocs.toml");
        std::fs::write(&path, "site_prefix = [").unwrap();
        assert!(matches!(
            Config::load_from_path(&path).await,
            Err(ConfigError::Toml(_))
        ));

        let config = Config {
            date_separator: Some("slash".to_string()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        assert!(matches!(
            config.apply_to_settings(&mut settings, dir.path()),
            Err(ConfigError::DateSeparator(_))
        ));
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::default();
        let base = Path::new("/base");
        assert_eq!(config.resolve_path("/abs", base), PathBuf::from("/abs"));
        assert_eq!(config.resolve_path("rel", base), PathBuf::from("/base/rel"));
    }

    #[test]
    fn test_settings_views() {
        let settings = Settings {
            probe_delay_ms: 50,
            request_timeout: 10,
            ..Default::default()
        };
        assert_eq!(settings.enrich_config().probe_delay, Duration::from_millis(50));
        assert_eq!(settings.client_options().timeout, Duration::from_secs(10));
        assert_eq!(settings.download_config().site_prefix, "oesi");
        assert_eq!(settings.page_config().stylesheet_name, "PublicAccess.css");
    }
}
