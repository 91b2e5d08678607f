//! Persistence layer.
//!
//! Saves and loads local user preferences to/from a JSON file.
//! Everything else lives on the backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::types::Language;

/// Default preferences file path.
const DEFAULT_PREFS_FILE: &str = "realty_crm_prefs.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub language: Language,
}

/// Save preferences to a JSON file.
pub fn save_preferences(prefs: &Preferences, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_PREFS_FILE);
    let json = serde_json::to_string_pretty(prefs).context("Failed to serialise preferences")?;

    std::fs::write(path, &json).context(format!("Failed to write preferences to {path}"))?;

    debug!(path, language = %prefs.language, "Preferences saved");
    Ok(())
}

/// Load preferences from a JSON file.
/// Returns the defaults if the file doesn't exist.
pub fn load_preferences(path: Option<&str>) -> Result<Preferences> {
    let path = path.unwrap_or(DEFAULT_PREFS_FILE);

    if !Path::new(path).exists() {
        debug!(path, "No saved preferences, using defaults");
        return Ok(Preferences::default());
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read preferences from {path}"))?;

    let prefs: Preferences =
        serde_json::from_str(&json).context(format!("Failed to parse preferences from {path}"))?;

    info!(path, language = %prefs.language, "Preferences loaded");
    Ok(prefs)
}

/// Flip the language between ru and uz and persist it.
pub fn toggle_language(path: Option<&str>) -> Result<Language> {
    let mut prefs = load_preferences(path)?;
    prefs.language = prefs.language.toggled();
    save_preferences(&prefs, path)?;
    Ok(prefs.language)
}

/// Delete the preferences file (for testing or reset).
pub fn delete_preferences(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_PREFS_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete preferences file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
