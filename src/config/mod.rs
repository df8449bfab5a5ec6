use crate::error::config::ConfigError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a warm, empathetic, and witty voice assistant named Gemini. You speak concisely and naturally. Keep your responses brief to facilitate real-time flow.";

pub const APP_NAME: &str = "live-voice";

/// Prebuilt voices offered by the speech service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
pub enum Voice {
    Zephyr,
    Kore,
    Puck,
    Charon,
    Fenrir,
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Zephyr
    }
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Zephyr,
        Voice::Kore,
        Voice::Puck,
        Voice::Charon,
        Voice::Fenrir,
    ];

    /// Identifier the speech service expects.
    pub fn id(&self) -> &'static str {
        match self {
            Voice::Zephyr => "Zephyr",
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Fenrir => "Fenrir",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Voice::Zephyr => "Zephyr (Female)",
            Voice::Kore => "Kore (Female)",
            Voice::Puck => "Puck (Male)",
            Voice::Charon => "Charon (Male)",
            Voice::Fenrir => "Fenrir (Male)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Voice::Zephyr => "Warm & Clear",
            Voice::Kore => "Bright & Energetic",
            Voice::Puck => "Friendly & Casual",
            Voice::Charon => "Deep & Calm",
            Voice::Fenrir => "Strong & Authoritative",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            voice: Voice::default(),
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
}

/// Directory holding every persisted file of this app.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

impl AppConfig {
    fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("settings.toml"))
    }

    /// Load settings. Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse settings"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read settings");
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let toml_str =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, toml_str).map_err(write_err)?;
        Ok(())
    }

    pub fn reset_prompt(&mut self) {
        self.session.system_prompt = default_system_prompt();
    }
}

/// Delete every persisted file ("clear all settings").
pub fn reset_all() -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    reset_dir(&dir)
}

pub fn reset_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(dir).map_err(|e| ConfigError::Write {
        path: dir.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_missing_file_when_load_then_defaults() {
        // Given
        let dir = tempfile::tempdir().unwrap();

        // When
        let config = AppConfig::load_from(&dir.path().join("settings.toml"));

        // Then
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.session.voice, Voice::Zephyr);
        assert_eq!(config.session.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn given_saved_settings_when_load_then_same_settings() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let mut config = AppConfig::default();
        config.session.voice = Voice::Charon;
        config.session.system_prompt = "Answer in haiku.".to_string();

        // When
        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path);

        // Then
        assert_eq!(loaded, config);
    }

    #[test]
    fn given_partial_file_when_load_then_missing_fields_defaulted() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[session]\nvoice = \"Puck\"\n").unwrap();

        // When
        let config = AppConfig::load_from(&path);

        // Then
        assert_eq!(config.session.voice, Voice::Puck);
        assert_eq!(config.session.model, DEFAULT_MODEL);
    }

    #[test]
    fn given_garbage_file_when_load_then_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn given_custom_prompt_when_reset_prompt_then_default_restored() {
        let mut config = AppConfig::default();
        config.session.system_prompt = "x".to_string();

        config.reset_prompt();

        assert_eq!(config.session.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn given_populated_dir_when_reset_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app");
        AppConfig::default().save_to(&target.join("settings.toml")).unwrap();

        reset_dir(&target).unwrap();

        assert!(!target.exists());
        assert!(reset_dir(&target).is_ok());
    }
}
