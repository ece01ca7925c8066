use crate::config::types::Config;
use anyhow::{Context, Result};
use std::fs;

pub fn save_settings(config: &Config) -> Result<()> {
    let path = config.settings_path();
    let content = serde_json::to_string_pretty(config).context("Failed to serialize settings")?;

    fs::write(&path, content)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;

    Ok(())
}
