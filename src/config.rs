use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Tunables the lesson player has cycled through across revisions; neither
/// the 80/95 threshold nor the 5/10/15s save interval is hardcoded anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// watch percentage at which a lesson counts as fully watched
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: f32,
    /// minimum seconds between progress writes during continuous playback
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
    /// preview mode: render everything, persist nothing
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_completion_threshold() -> f32 {
    95.0
}

fn default_save_interval_secs() -> u64 {
    10
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            completion_threshold: default_completion_threshold(),
            save_interval_secs: default_save_interval_secs(),
            preview: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl PlayerConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

/// Bearer token for the progress API, from the environment
pub fn api_token() -> Option<String> {
    let _ = dotenvy::dotenv();
    dotenvy::var("COURSE_API_TOKEN").ok()
}
