use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use common::DEFAULT_EXTENSIONS;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 70;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub directories: Vec<String>,
    pub extensions: Vec<String>,
    pub similarity_threshold: u8,
    pub read_tags: bool,
    pub follow_links: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            read_tags: true,
            follow_links: false,
        }
    }
}

impl Settings {
    pub fn threshold(&self) -> f64 {
        f64::from(self.similarity_threshold.clamp(1, 100)) / 100.0
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("RECONCILE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Load settings from `path`, writing the defaults there first when the file
/// does not exist. The flag is `true` when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(Settings, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut settings: Settings = if contents.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&contents)?
        };
        settings.similarity_threshold = settings.similarity_threshold.clamp(1, 100);
        settings.directories.retain(|dir| !dir.trim().is_empty());
        return Ok((settings, false));
    }

    let settings = Settings::default();
    save_config(path, &settings)?;
    Ok((settings, true))
}

pub fn save_config(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(settings)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
