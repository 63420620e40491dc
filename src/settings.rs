// Persistent configuration, stored as pretty JSON next to the log file.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SettingsError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_token: Option<String>, // GitHub personal access token.
    pub base_path: String,          // Character directory inside the repository.
    pub github_api_url: String,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub character_name: String,
    pub user_name: String,
    pub context_messages: usize,
    pub default_timeout_secs: u64,
    pub thought_timeout_secs: u64,
    pub tag_timeout_secs: u64,
    pub scene_timeout_secs: u64,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            repo_owner: String::new(),
            repo_name: String::new(),
            repo_token: None,
            base_path: String::new(),
            github_api_url: "https://api.github.com".to_string(),
            openai_api_key: None,
            model: "gpt-4o-mini".to_string(),
            character_name: "Character".to_string(),
            user_name: "User".to_string(),
            context_messages: 4,
            default_timeout_secs: 30,
            thought_timeout_secs: 60,
            tag_timeout_secs: 60,
            scene_timeout_secs: 90,
            log_dir: None,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_dir() -> PathBuf {
        dir::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stage_director")
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join("settings.json")
    }

    // Loads the default settings file, falling back to defaults when it is missing,
    // then fills absent secrets from the environment.
    pub fn load() -> Self {
        let mut settings = match Self::load_settings_from_file(Self::default_path()) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("[Settings] Using defaults: {e}");
                Self::default()
            }
        };
        settings.apply_env();
        settings
    }

    pub fn load_settings_from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let data = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&data)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let data = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        if self.openai_api_key.is_none() {
            self.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.repo_token.is_none() {
            self.repo_token = std::env::var("GITHUB_TOKEN").ok();
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(Self::default_dir)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn thought_timeout(&self) -> Duration {
        Duration::from_secs(self.thought_timeout_secs)
    }

    pub fn tag_timeout(&self) -> Duration {
        Duration::from_secs(self.tag_timeout_secs)
    }

    pub fn scene_timeout(&self) -> Duration {
        Duration::from_secs(self.scene_timeout_secs)
    }
}
