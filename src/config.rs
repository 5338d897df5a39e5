//! Configuration for Prism Studio
//!
//! The audio constants (sample rates, frame size) are fixed in
//! [`crate::voice`] and not configurable; what loads from disk is the
//! behavior profile handed to the remote session on connect.

use directories::ProjectDirs;
use serde::Deserialize;

use crate::Result;

/// Prism configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live session behavior profile
    pub live: LiveConfig,
}

/// Behavior profile sent to the remote session when it is opened
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Model identifier for the streaming session
    pub model: String,

    /// Prebuilt voice name for synthesized replies
    pub voice: String,

    /// System instruction applied to the conversation
    pub system_instruction: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Kore".to_string(),
            system_instruction: "You are a helpful, witty, and concise AI assistant. \
                                 You are chatting with the user via voice."
                .to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the platform config directory, falling back
    /// to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        if let Some(dirs) = ProjectDirs::from("dev", "prismstudio", "prism") {
            let path = dirs.config_dir().join("config.toml");
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                let config = toml::from_str(&raw)?;
                tracing::debug!(path = %path.display(), "loaded configuration");
                return Ok(config);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }
}
