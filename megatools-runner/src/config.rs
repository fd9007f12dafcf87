use crate::process::ProcessConfig;
use megatools_core::{MegaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upstream location of prebuilt executables; `.exe` is appended on Windows
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://raw.githubusercontent.com/justaprudev/megatools/master/megatools";

/// Where the executable lives and how it is run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MegatoolsConfig {
    /// Explicit executable; skips lookup and download when set
    pub executable: Option<PathBuf>,
    /// Scratch directory holding the downloaded executable and `filename` lookups
    pub temp_dir: PathBuf,
    pub download_url: String,
    /// Look for `megatools` on `PATH` before downloading
    pub search_path: bool,
    pub process: ProcessConfig,
}

impl Default for MegatoolsConfig {
    fn default() -> Self {
        Self {
            executable: None,
            temp_dir: std::env::temp_dir(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            search_path: false,
            process: ProcessConfig::default(),
        }
    }
}

impl MegatoolsConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MegaError::InvalidConfiguration(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn with_executable<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.executable = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_temp_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.temp_dir = dir.as_ref().to_path_buf();
        self
    }
}
