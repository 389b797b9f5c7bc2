use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const APP_DIR: &str = "content-scheduler";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub x_access_token: Option<String>,

    /// Language code used when a generation request names none.
    pub default_language: String,
    /// Separator between posts in a generated response.
    pub block_delimiter: String,

    pub scheduler_interval_secs: u64,
    pub publish_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub max_concurrent_publishes: usize,
    pub scrape_min_chars: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("content.db").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-pro".to_string(),
            x_access_token: None,
            default_language: "ja".to_string(),
            block_delimiter: "---".to_string(),
            scheduler_interval_secs: 60,
            publish_timeout_secs: 30,
            generation_timeout_secs: 120,
            max_concurrent_publishes: 4,
            scrape_min_chars: 100,
        }
    }
}

impl Config {
    /// Reads the config file (writing a default one on first run), then
    /// applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = set("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(token) = set("X_ACCESS_TOKEN") {
            self.x_access_token = Some(token);
        }
        if let Some(path) = set("CONTENT_SCHEDULER_DB") {
            self.db_path = path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("scheduler_interval_secs", self.scheduler_interval_secs),
            ("publish_timeout_secs", self.publish_timeout_secs),
            ("generation_timeout_secs", self.generation_timeout_secs),
            ("max_concurrent_publishes", self.max_concurrent_publishes as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(AppError::Config(format!("{name} must be greater than zero")));
        }
        if self.block_delimiter.trim().is_empty() {
            return Err(AppError::Config("block_delimiter must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
