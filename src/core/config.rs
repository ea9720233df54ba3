use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted preferences. Everything else (credential, base URL, model) comes
/// from the environment or the command line on every run.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// UI theme name ("dark" or "light")
    pub theme: Option<String>,
    /// Enable markdown rendering of assistant messages
    pub markdown: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "causerie")
            .ok_or("failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    pub fn theme_name(&self) -> &str {
        self.theme.as_deref().unwrap_or("dark")
    }

    pub fn markdown_enabled(&self) -> bool {
        self.markdown.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("config.toml");
        let config = Config::load_from_path(&path).expect("load defaults");
        assert_eq!(config.theme_name(), "dark");
        assert!(config.markdown_enabled());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            theme: Some("light".to_string()),
            markdown: Some(false),
        };
        config.save_to_path(&path).expect("save config");

        let reloaded = Config::load_from_path(&path).expect("reload config");
        assert_eq!(reloaded.theme_name(), "light");
        assert!(!reloaded.markdown_enabled());
    }

    #[test]
    fn unknown_theme_field_defaults_are_stable() {
        let config = Config::default();
        assert_eq!(config.theme_name(), "dark");
    }
}
