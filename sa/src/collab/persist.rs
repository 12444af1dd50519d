//! Derived-state snapshot saved at shutdown and restored at startup

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::blackboard::DerivedState;

/// Read a snapshot; `None` when no file exists
pub fn load(path: &Path) -> Result<Option<DerivedState>> {
    debug!(?path, "persist::load: called");
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let state = serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))?;
    info!(path = %path.display(), "Restored derived state");
    Ok(Some(state))
}

pub fn save(path: &Path, state: &DerivedState) -> Result<()> {
    debug!(?path, "persist::save: called");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create persist directory")?;
    }
    let json = serde_json::to_string_pretty(state).context("Failed to serialize derived state")?;
    fs::write(path, json).context(format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Saved derived state");
    Ok(())
}
