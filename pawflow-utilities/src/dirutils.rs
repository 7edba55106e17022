use std::{fs, path::Path};

use log::info;
use pawflow_models::errors::SendableError;

pub fn ensure_dir(path: &Path) -> Result<(), SendableError> {
    if !path.is_dir() {
        fs::create_dir_all(path)?;
        info!("Created directory {}", path.display());
    }
    Ok(())
}

/// Creates the engine's on-disk layout under the base data directory and
/// returns (state_dir, logs_dir).
pub fn ensure_data_layout(data_dir: &Path) -> Result<(std::path::PathBuf, std::path::PathBuf), SendableError> {
    let state_dir = data_dir.join("state");
    let logs_dir = data_dir.join("logs");
    ensure_dir(data_dir)?;
    ensure_dir(&state_dir)?;
    ensure_dir(&logs_dir)?;
    Ok((state_dir, logs_dir))
}
