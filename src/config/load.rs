use crate::config::types::{Config, SETTINGS_FILE};
use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

impl Config {
    /// 從目前工作目錄的 `settings.json` 載入
    pub fn new() -> Result<Self> {
        let dir = std::env::current_dir().context("無法取得目前工作目錄")?;
        Ok(Self::load(&dir))
    }

    /// 檔案不存在時使用預設值；檔案損壞時記錄警告並使用預設值
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let mut config = match Self::read_settings(&dir.join(SETTINGS_FILE)) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("設定檔無法使用，改用預設值: {e:#}");
                Self::default()
            }
        };
        config.preferences.normalize();
        config.base_dir = dir.to_path_buf();
        config
    }

    fn read_settings(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .map(Some)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }
}
