//! Configuration: the full set of settings the core consumes (spec §6),
//! independent of how a front end gathers them. Loaded from TOML, with a
//! `Default` matching the documented defaults.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration: bearer token, storage locations, and the
/// discovery/retry knobs that apply to every request the core makes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub save_path: String,
    pub database_path: String,
    pub api_delay_ms: u64,
    pub api_client_timeout_sec: u64,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub log_api_requests: bool,
    pub download: DownloadSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            save_path: "downloads".to_string(),
            database_path: "civitai-dl.sqlite".to_string(),
            api_delay_ms: 250,
            api_client_timeout_sec: 30,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            log_api_requests: false,
            download: DownloadSection::default(),
        }
    }
}

/// The `[Download]` section of the config file: what to search for, how
/// much of it to fetch, and which auxiliary artifacts to save alongside it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub concurrency: usize,
    pub tag: String,
    pub query: String,
    pub model_types: Vec<String>,
    pub base_models: Vec<String>,
    pub usernames: Vec<String>,
    pub nsfw: String,
    pub limit: u32,
    pub max_pages: Option<u32>,
    pub sort: String,
    pub period: String,
    pub model_version_id: Option<u64>,
    pub model_id: Option<u64>,
    pub primary_only: bool,
    pub pruned: bool,
    pub fp16: bool,
    pub all_versions: bool,
    pub ignore_base_models: Vec<String>,
    pub ignore_file_name_strings: Vec<String>,
    pub skip_confirmation: bool,
    pub save_metadata: bool,
    pub save_model_info: bool,
    pub save_version_images: bool,
    pub save_model_images: bool,
    pub download_meta_only: bool,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            concurrency: 10,
            tag: String::new(),
            query: String::new(),
            model_types: Vec::new(),
            base_models: Vec::new(),
            usernames: Vec::new(),
            nsfw: "None".to_string(),
            limit: 100,
            max_pages: None,
            sort: "Newest".to_string(),
            period: "AllTime".to_string(),
            model_version_id: None,
            model_id: None,
            primary_only: true,
            pruned: false,
            fp16: false,
            all_versions: false,
            ignore_base_models: Vec::new(),
            ignore_file_name_strings: Vec::new(),
            skip_confirmation: false,
            save_metadata: false,
            save_model_info: false,
            save_version_images: false,
            save_model_images: false,
            download_meta_only: false,
        }
    }
}

impl Config {
    /// Parses a TOML document into a `Config`, falling back to
    /// [`Default`] for any field the document omits.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads and parses the config file at `path`.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.save_path, "downloads");
        assert_eq!(config.download.concurrency, 10);
        assert!(config.download.primary_only);
        assert_eq!(config.download.nsfw, "None");
    }

    #[test]
    fn from_toml_str_overrides_only_specified_fields() {
        let toml = r#"
            api_key = "secret"

            [download]
            limit = 50
            query = "anime"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.download.limit, 50);
        assert_eq!(config.download.query, "anime");
        assert_eq!(config.download.concurrency, 10);
        assert_eq!(config.save_path, "downloads");
    }

    #[test]
    fn from_toml_str_rejects_malformed_input() {
        let result = Config::from_toml_str("not = [valid");
        assert!(result.is_err());
    }
}
