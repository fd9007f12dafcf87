// Locating and downloading the megatools executable

use crate::config::MegatoolsConfig;
use megatools_core::{MegaError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BINARY_NAME: &str = "megatools";

/// Platform file name of the executable
pub fn executable_file_name() -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", BINARY_NAME)
    } else {
        BINARY_NAME.to_string()
    }
}

fn download_url(config: &MegatoolsConfig) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", config.download_url)
    } else {
        config.download_url.clone()
    }
}

/// Find an executable without touching the network.
///
/// Order: the configured path, `PATH` (only with `search_path`), then the
/// copy previously downloaded into the temp directory.
pub fn locate(config: &MegatoolsConfig) -> Option<PathBuf> {
    if let Some(executable) = &config.executable {
        return Some(executable.clone());
    }

    if config.search_path {
        if let Ok(path) = which::which(BINARY_NAME) {
            debug!(path = %path.display(), "Found executable on PATH");
            return Some(path);
        }
    }

    let cached = config.temp_dir.join(executable_file_name());
    cached.is_file().then_some(cached)
}

/// Locate the executable, downloading it into the temp directory if needed
pub async fn install(config: &MegatoolsConfig) -> Result<PathBuf> {
    if let Some(path) = locate(config) {
        return Ok(path);
    }

    let target = config.temp_dir.join(executable_file_name());
    let url = download_url(config);
    info!(url = %url, target = %target.display(), "Downloading executable");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| MegaError::NetworkError(format!("Failed to download {}: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(MegaError::NetworkError(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }
    let binary = response
        .bytes()
        .await
        .map_err(|e| MegaError::NetworkError(format!("Failed to read {}: {}", url, e)))?;

    tokio::fs::write(&target, &binary).await?;
    make_executable(&target)?;

    info!(target = %target.display(), bytes = binary.len(), "Executable installed");
    Ok(target)
}

/// Add execute permission for owner, group and others
#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
