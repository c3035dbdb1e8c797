use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::protocols::{SearchParams, ORIGINAL_YEAR_PAIRS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub protocols: ProtocolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root of the image tree
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Sub-directories of `image_dir` that hold images, scanned in this order
    #[serde(default = "default_directories")]
    pub directories: Vec<String>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Thermal polarizations left out of the catalog
    #[serde(default = "default_excluded_polarizations")]
    pub excluded_polarizations: Vec<String>,

    #[serde(default)]
    pub landmarks: LandmarkConfig,
}

/// Eye coordinates written for every file. The dataset ships no per-image
/// landmarks, so this is a single placeholder position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LandmarkConfig {
    pub right_eye: (i32, i32),
    pub left_eye: (i32, i32),
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            right_eye: (106, 140),
            left_eye: (106, 65),
        }
    }
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("/idiap/resource/database/pola_thermal")
}

fn default_directories() -> Vec<String> {
    vec!["Visible/IOD87_B".to_string(), "Polarimetric".to_string()]
}

fn default_image_extensions() -> Vec<String> {
    vec!["png".to_string()]
}

fn default_excluded_polarizations() -> Vec<String> {
    vec!["S1".to_string(), "S2".to_string()]
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            directories: default_directories(),
            image_extensions: default_image_extensions(),
            excluded_polarizations: default_excluded_polarizations(),
            landmarks: LandmarkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    /// (gallery year, probe year) of each `original_*` protocol
    #[serde(default = "default_original_years")]
    pub original_years: Vec<(i32, i32)>,

    #[serde(default)]
    pub search: SearchParams,
}

fn default_original_years() -> Vec<(i32, i32)> {
    ORIGINAL_YEAR_PAIRS.to_vec()
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            original_years: default_original_years(),
            search: SearchParams::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("polathermal")
        .join("db.sql3")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            dataset: DatasetConfig::default(),
            protocols: ProtocolsConfig::default(),
        }
    }
}

impl Config {
    /// Load from `POLATHERMAL_CONFIG` or the default location, writing the
    /// defaults there on first use.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polathermal")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("POLATHERMAL_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
