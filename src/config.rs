//! loglens configuration file
//!
//! Read from `--config`, or `$XDG_CONFIG_HOME/loglens/config.toml`
//! (`~/.config/loglens/config.toml`). A missing default file means defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use loglens_logs::parse_duration;
use loglens_search::SearchOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub view: ViewConfig,
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Most remote entries held in memory
    pub budget: usize,
    pub page_size: usize,
    pub keep_alive: String,
    pub track_total_hits: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            budget: 10_000,
            page_size: 500,
            keep_alive: "1m".to_string(),
            track_total_hits: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub only_marked: bool,
    /// Relative window the time filter starts with; `--recent` enables it
    pub default_relative: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            only_marked: false,
            default_relative: "15m".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Marks and palette file; defaults to `settings.json` next to the config
    pub path: Option<String>,
}

impl Config {
    /// Load from an explicit path (must exist) or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (config_dir().join("config.toml"), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if parse_duration(&config.view.default_relative).is_none() {
            anyhow::bail!("view.default_relative: '{}' is not a duration", config.view.default_relative);
        }
        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        match &self.settings.path {
            Some(path) => expand_home(path),
            None => config_dir().join("settings.json"),
        }
    }

    /// Request template for a remote search against `index`
    pub fn search_options(&self, index: &str) -> SearchOptions {
        SearchOptions {
            index: index.to_string(),
            size: Some(self.search.page_size),
            keep_alive: Some(self.search.keep_alive.clone()),
            track_total_hits: Some(self.search.track_total_hits),
            duration: Some(self.view.default_relative.clone()),
            ..Default::default()
        }
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("loglens")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.budget, 10_000);
        assert_eq!(config.search.page_size, 500);
        assert_eq!(config.view.default_relative, "15m");
        assert!(config.settings_path().ends_with("loglens/settings.json"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [search]
            budget = 250

            [settings]
            path = "/tmp/marks.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.search.budget, 250);
        assert_eq!(config.search.keep_alive, "1m");
        assert!(!config.view.only_marked);
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/marks.json"));
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        assert!(Config::parse("[view]\ndefault_relative = \"soon\"").is_err());
        assert!(Config::parse("[search]\nbudget = \"many\"").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loglens.toml");
        std::fs::write(&path, "[view]\nonly_marked = true\n").unwrap();

        assert!(Config::load(Some(&path)).unwrap().view.only_marked);
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_search_options_template() {
        let options = Config::default().search_options("logs-*");
        assert_eq!(options.index, "logs-*");
        assert_eq!(options.size, Some(500));
        assert_eq!(options.keep_alive.as_deref(), Some("1m"));
        assert_eq!(options.search_after, None);
    }

    #[test]
    fn test_expand_home() {
        assert!(expand_home("~/x.json").ends_with("x.json"));
        assert_eq!(expand_home("/abs/x.json"), PathBuf::from("/abs/x.json"));
    }
}
