//! Configuration loading and management

use std::path::PathBuf;

use anyhow::Result;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for status IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Token that arms the system when heard while idle
    pub wake_word: String,

    /// Optional name for the personalized greeting
    pub user_name: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("beckon");

        let socket_path = data_dir.join("daemon.sock");

        let wake_word = std::env::var("BECKON_WAKE_WORD")
            .ok()
            .filter(|word| !word.trim().is_empty())
            .map(|word| word.trim().to_lowercase())
            .unwrap_or_else(|| "beckon".to_string());

        let user_name = std::env::var("BECKON_USER")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self {
            socket_path,
            data_dir,
            wake_word,
            user_name,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("beckon"));
        assert!(!config.wake_word.is_empty());
    }
}
