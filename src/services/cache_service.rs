use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the StreamNook data directory under the platform's local data dir
pub fn get_app_data_dir() -> Result<PathBuf> {
    let local_data = dirs::data_local_dir().context("No local data directory on this platform")?;

    let app_dir = if cfg!(debug_assertions) {
        local_data.join("com.streamnook.dev")
    } else {
        local_data.join("StreamNook")
    };

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir).context("Failed to create StreamNook directory")?;
    }

    Ok(app_dir)
}

/// Get the directory the drops core keeps its persisted state in
pub fn get_drops_state_dir() -> Result<PathBuf> {
    let state_dir = get_app_data_dir()?.join("drops");

    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).context("Failed to create drops state directory")?;
    }

    Ok(state_dir)
}
