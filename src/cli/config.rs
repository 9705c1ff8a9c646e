// ABOUTME: Configuration management for the cntr application
// ABOUTME: Loads settings and persisted variable overrides from files and environment variables

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::output::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Host directory service data lives under. Detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,

    /// Persisted variable overrides, applied below command line overrides.
    #[serde(default)]
    pub variables: IndexMap<String, String>,

    /// Services added with `cntr add`, in the order they were added.
    #[serde(default)]
    pub installed: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// File this configuration was read from and is saved back to.
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("catalog")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_dir: default_catalog_dir(),
            output_dir: default_output_dir(),
            install_path: None,
            variables: IndexMap::new(),
            installed: Vec::new(),
            logging: LoggingConfig::default(),
            path: PathBuf::from("cntr.yaml"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.merge_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read the file only, without environment overrides. Used when the
    /// configuration is going to be written back.
    pub fn read(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(),
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            if contents.trim().is_empty() {
                Config::default()
            } else {
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("Invalid configuration in {}", config_path.display()))?
            }
        } else {
            debug!("No configuration at {}, using defaults", config_path.display());
            Config::default()
        };

        config.path = config_path;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> PathBuf {
        let possible_paths = [
            PathBuf::from("cntr.yaml"),
            PathBuf::from("cntr.yml"),
            PathBuf::from(".cntr.yaml"),
            PathBuf::from(".cntr.yml"),
        ];

        for path in possible_paths {
            if path.exists() {
                return path;
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".cntr").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        // Default path (may not exist)
        PathBuf::from("cntr.yaml")
    }

    /// Apply `CNTR_*` settings on top of the file values
    pub fn merge_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CNTR_CATALOG_DIR") {
            self.catalog_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CNTR_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("CNTR_INSTALL_PATH") {
            self.install_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("CNTR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CNTR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Where service data is placed on the host.
    pub fn install_path(&self) -> PathBuf {
        if let Some(path) = &self.install_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("cntr"))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Persist overrides, later values winning.
    pub fn set_variables(&mut self, vars: IndexMap<String, String>) {
        self.variables.extend(vars);
    }

    /// Drop persisted overrides, returning the keys that were present.
    pub fn unset_variables(&mut self, keys: &[String]) -> Vec<String> {
        keys.iter()
            .filter(|key| self.variables.shift_remove(key.as_str()).is_some())
            .cloned()
            .collect()
    }

    /// Add services to the installed set, returning the ones that were new.
    pub fn add_installed(&mut self, names: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        for name in names {
            if !self.installed.contains(name) {
                self.installed.push(name.clone());
                added.push(name.clone());
            }
        }
        added
    }

    /// Drop services from the installed set, returning the ones that were present.
    pub fn remove_installed(&mut self, names: &[String]) -> Vec<String> {
        let removed: Vec<String> = self
            .installed
            .iter()
            .filter(|name| names.contains(name))
            .cloned()
            .collect();
        self.installed.retain(|name| !names.contains(name));
        removed
    }

    /// Write the configuration back to the file it was read from
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        write_atomic(path, contents.as_bytes())
            .with_context(|| format!("Failed to save configuration to {}", path.display()))?;
        debug!("Configuration saved to {}", path.display());
        Ok(())
    }
}
