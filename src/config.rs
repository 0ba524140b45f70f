//! Configuration management for stepdiff
//!
//! Stores settings in ~/.config/stepdiff/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub openrouter_api_key: Option<String>,
    /// Optional model-id override for review-plan generation
    pub model: Option<String>,
    /// Attempt budget for model-backed grouping before the last schema error propagates
    pub grouping_max_attempts: Option<u32>,
    /// Anonymous id sent as OpenRouter's `user` field for routing stickiness
    pub openrouter_user_id: Option<String>,
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stepdiff"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        eprintln!(
                            "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir =
            Self::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;

        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create config directory: {}", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                eprintln!("  Warning: Failed to set config directory permissions: {}", e);
            }
        }

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        #[cfg(unix)]
        {
            write_config_atomic(&path, &content)
                .map_err(|e| format!("Failed to write config: {}", e))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        }

        Ok(())
    }

    /// Get the OpenRouter API key (environment variable takes precedence)
    pub fn get_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            return Some(key);
        }
        self.openrouter_api_key.clone()
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        std::env::var("OPENROUTER_API_KEY").is_ok() || self.openrouter_api_key.is_some()
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/stepdiff/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(unix)]
fn write_config_atomic(path: &std::path::Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
        eprintln!("  Warning: Failed to set temp config file permissions: {}", e);
    }

    file.write_all(content.as_bytes()).map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
