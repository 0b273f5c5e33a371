//! Persisted user settings: marks, the custom color palette, view toggles.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use loglens_types::Signature;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("settings file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings storage unavailable: {0}")]
    Unavailable(String),
}

/// Everything that survives a restart
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub marks: BTreeMap<Signature, String>,
    pub custom_colors: Vec<String>,
    pub only_marked: bool,
}

/// Partial update; `None` fields are left untouched
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub marks: Option<BTreeMap<Signature, String>>,
    pub custom_colors: Option<Vec<String>>,
    pub only_marked: Option<bool>,
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(marks) = patch.marks {
            self.marks = marks;
        }
        if let Some(colors) = patch.custom_colors {
            self.custom_colors = colors;
        }
        if let Some(only_marked) = patch.only_marked {
            self.only_marked = only_marked;
        }
    }
}

/// Settings persistence collaborator
pub trait SettingsStore: Send + Sync {
    fn get(&self) -> Result<Settings, SettingsError>;

    fn set(&self, patch: SettingsPatch) -> Result<(), SettingsError>;
}

/// Settings kept as pretty-printed JSON on disk
#[derive(Debug, Clone)]
pub struct JsonSettingsFile {
    path: PathBuf,
}

impl JsonSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for JsonSettingsFile {
    /// A missing file yields defaults
    fn get(&self) -> Result<Settings, SettingsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_str(&content).map_err(|source| SettingsError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn set(&self, patch: SettingsPatch) -> Result<(), SettingsError> {
        let mut settings = self.get()?;
        settings.apply(patch);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let content = serde_json::to_string_pretty(&settings).map_err(|source| SettingsError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, content).map_err(|e| self.io_error(e))
    }
}

/// In-process settings, for tests and for runs without a settings file
#[derive(Debug, Default)]
pub struct MemorySettings {
    settings: Mutex<Settings>,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self) -> Result<Settings, SettingsError> {
        Ok(self.settings.lock().clone())
    }

    fn set(&self, patch: SettingsPatch) -> Result<(), SettingsError> {
        self.settings.lock().apply(patch);
        Ok(())
    }
}
