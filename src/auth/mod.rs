use crate::config::config_dir;
use crate::error::prelude::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
const FALLBACK_KEY_VAR: &str = "API_KEY";

/// Client-side API key storage in a `.env`-style file. The key is only ever
/// handed to the speech service.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    env_path: PathBuf,
}

impl ApiKeyStore {
    pub fn new(env_path: PathBuf) -> Self {
        Self { env_path }
    }

    pub fn open_default() -> Result<Self, ConfigError> {
        let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dir.join(".env")))
    }

    pub fn path(&self) -> &Path {
        &self.env_path
    }

    /// Read the persisted key, if any. Other entries in the file are ignored
    /// and the process environment is left untouched.
    pub fn read(&self) -> Result<Option<String>, ConfigError> {
        if !self.env_path.exists() {
            return Ok(None);
        }

        let read_err = |message: String| ConfigError::Read {
            path: self.env_path.display().to_string(),
            message,
        };
        let entries = dotenvy::from_path_iter(&self.env_path).map_err(|e| read_err(e.to_string()))?;
        for entry in entries {
            let (key, value) = entry.map_err(|e| read_err(e.to_string()))?;
            if key == API_KEY_VAR && !value.is_empty() {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Persist `key`, replacing any previous one and keeping unrelated lines.
    /// An empty key removes the entry.
    pub fn save(&self, key: &str) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::Write {
            path: self.env_path.display().to_string(),
            message: e.to_string(),
        };

        // Read existing .env content
        let existing_content = if self.env_path.exists() {
            fs::read_to_string(&self.env_path).map_err(write_err)?
        } else {
            String::new()
        };

        let prefix = format!("{API_KEY_VAR}=");
        let mut lines: Vec<String> = existing_content
            .lines()
            .filter(|line| !line.starts_with(&prefix))
            .map(|s| s.to_string())
            .collect();

        let key = key.trim();
        if !key.is_empty() {
            lines.push(format!("{prefix}{key}"));
        }

        if let Some(parent) = self.env_path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.env_path, lines.join("\n") + "\n").map_err(write_err)?;
        Ok(())
    }
}

/// Pick the key for a session: explicit value, then the persisted key, then
/// the process environment (after loading a working-directory `.env`).
pub fn resolve_api_key(explicit: Option<&str>, store: Option<&ApiKeyStore>) -> String {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return key.to_string();
    }

    if let Some(store) = store {
        match store.read() {
            Ok(Some(key)) => return key,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable key file"),
        }
    }

    let _ = dotenvy::dotenv();
    [API_KEY_VAR, FALLBACK_KEY_VAR]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default()
}

/// Show enough of a key to recognise it.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
