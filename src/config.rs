//! Configuration types and loading logic.
//!
//! `Config` is a direct 1-to-1 mapping of `config.toml`.  Every field has a
//! `Default` impl so the file is entirely optional — running `mail-export`
//! without any config file talks to the default service and exports under the
//! platform's document directory.
//!
//! # File format
//!
//! ```toml
//! [api]
//! url = "https://mail.example.com/api"
//!
//! [paths]
//! output_dir = "/home/alice/Documents/mail-export"  # parent of default export paths
//! log_dir    = "/home/alice/.local/share/mail-export/logs"
//!
//! [telemetry]
//! disabled = true
//! ```
//!
//! The `ET_API_URL` environment variable overrides `[api] url`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::remote::DEFAULT_API_URL;

/// Directory name used under the platform config/data/document dirs.
pub const APP_DIR: &str = "mail-export";

pub const API_URL_ENV: &str = "ET_API_URL";

// ─── Top-level ────────────────────────────────────────────────────────────────

/// Root configuration object, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

// ─── [api] ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL of the account service, without a trailing slash.
    #[serde(default = "default_api_url")]
    pub url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { url: default_api_url() }
    }
}

// ─── [paths] ──────────────────────────────────────────────────────────────────

/// Where exports and log files go.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// Parent of the default export path (`<output_dir>/<email>`) and the
    /// base that relative export paths are resolved against.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// One log file per run is written here.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
        }
    }
}

// ─── [telemetry] ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Same effect as `--telemetry-off`.
    #[serde(default)]
    pub disabled: bool,
}

// ─── Defaults ─────────────────────────────────────────────────────────────────

pub fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

/// `<documents>/mail-export`, falling back to the home directory and then `.`.
pub fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `<data_local>/mail-export/logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("logs")
}

/// `<config>/mail-export/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

// ─── Loader ───────────────────────────────────────────────────────────────────

/// Read and parse a `Config` from `path`.
///
/// A missing file is not an error: a fully-defaulted `Config` is returned.
/// Returns an error if the file exists but cannot be read or is not valid
/// TOML.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

impl Config {
    /// Apply environment overrides.  Empty values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api.url = url;
        }
        self
    }

    /// Load from `explicit`, else the default location, then apply
    /// `ET_API_URL`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => load_config(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides(std::env::var(API_URL_ENV).ok()))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // ── Defaults ─────────────────────────────────────────────────────────────

    #[test]
    fn default_config_enables_telemetry() {
        let cfg = Config::default();
        assert!(!cfg.telemetry.disabled);
        assert_eq!(cfg.api.url, DEFAULT_API_URL);
    }

    #[test]
    fn default_paths_are_namespaced() {
        let paths = PathsConfig::default();
        assert!(paths.output_dir.ends_with(APP_DIR));
        assert!(paths.log_dir.ends_with(Path::new(APP_DIR).join("logs")));
    }

    // ── Parsing ──────────────────────────────────────────────────────────────

    #[test]
    fn partial_toml_uses_defaults_for_missing_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [paths]
            output_dir = "/srv/exports"
            "#,
        )
        .expect("parse failed");
        assert_eq!(cfg.paths.output_dir, PathBuf::from("/srv/exports"));
        assert_eq!(cfg.paths.log_dir, default_log_dir());
        assert_eq!(cfg.api.url, DEFAULT_API_URL);
    }

    #[test]
    fn empty_toml_deserialises_to_defaults() {
        let cfg: Config = toml::from_str("").expect("empty toml should parse");
        assert_eq!(cfg, Config::default());
    }

    // ── Overrides ────────────────────────────────────────────────────────────

    #[test]
    fn env_url_overrides_file() {
        let cfg = Config::default().with_env_overrides(Some("http://10.0.0.1/api".into()));
        assert_eq!(cfg.api.url, "http://10.0.0.1/api");
    }

    #[test]
    fn empty_env_url_is_ignored() {
        let cfg = Config::default().with_env_overrides(Some("  ".into()));
        assert_eq!(cfg.api.url, DEFAULT_API_URL);
    }

    // ── load_config ───────────────────────────────────────────────────────────

    #[test]
    fn load_config_returns_defaults_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("config.toml")).expect("should not error on missing file");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_config_parses_valid_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
            [api]
            url = "https://mail.example.com/api"

            [telemetry]
            disabled = true
            "#
        )
        .unwrap();

        let cfg = load_config(f.path()).expect("should parse valid toml");
        assert_eq!(cfg.api.url, "https://mail.example.com/api");
        assert!(cfg.telemetry.disabled);
    }

    #[test]
    fn load_config_errors_on_invalid_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "[api\nurl = ").unwrap();
        let err = load_config(f.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }
}
