use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::paths::{AppDirs, RunMode};

pub const DEFAULT_API_BASE_URL: &str = "http://export.arxiv.org/api/query";
pub const SETTINGS_FILE_NAME: &str = "arxiv-harvester.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub download_workers: Option<usize>,
    #[serde(default)]
    pub run_mode: Option<RunMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub schema_version: u32,
    pub api_base_url: String,
    pub user_agent: String,
    pub download_workers: usize,
    pub run_mode: RunMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            download_workers: 1,
            run_mode: RunMode::detect(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>, dirs: &AppDirs) -> Result<Settings, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => dirs.config_dir().join(SETTINGS_FILE_NAME).into_std_path_buf(),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<Settings, HarvestError> {
        let defaults = Settings::default();

        let api_base_url = match config.api_base_url {
            Some(url) if url.trim().is_empty() => {
                return Err(HarvestError::ConfigParse(
                    "api_base_url must not be empty".to_string(),
                ));
            }
            Some(url) => url.trim().to_string(),
            None => defaults.api_base_url,
        };

        Ok(Settings {
            schema_version: config.schema_version.unwrap_or(1),
            api_base_url,
            user_agent: config
                .user_agent
                .filter(|agent| !agent.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            download_workers: config.download_workers.unwrap_or(1).max(1),
            run_mode: config.run_mode.unwrap_or(defaults.run_mode),
        })
    }
}

pub fn default_user_agent() -> String {
    format!("arxiv-harvester/{}", env!("CARGO_PKG_VERSION"))
}
