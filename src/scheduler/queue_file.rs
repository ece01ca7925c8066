//! 佇列快照：只保存尚未完成的工作

use crate::job::{EncodingOptions, Job};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const QUEUE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub source: PathBuf,
    pub output: PathBuf,
    /// `EncodingOptions` 攤平成字串鍵值
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub version: u32,
    pub jobs: Vec<QueueEntry>,
}

impl QueueSnapshot {
    #[must_use]
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        Self {
            version: QUEUE_FORMAT_VERSION,
            jobs: jobs
                .into_iter()
                .map(|job| QueueEntry {
                    source: job.source_path().to_path_buf(),
                    output: job.output_path().to_path_buf(),
                    options: job.options().to_flat_map(),
                })
                .collect(),
        }
    }

    /// 還原成新的 `Enqueued` 工作；無法解析的項目記錄警告後略過
    #[must_use]
    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
            .into_iter()
            .filter_map(|entry| match EncodingOptions::from_flat_map(&entry.options) {
                Ok(options) => Some(Job::new(&entry.source, &entry.output, options)),
                Err(e) => {
                    log::warn!("略過無法還原的工作 {}: {e:#}", entry.source.display());
                    None
                }
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize queue")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write queue to {}", path.display()))
    }

    /// 檔案不存在時回傳空的快照
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                version: QUEUE_FORMAT_VERSION,
                jobs: Vec::new(),
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue from {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse queue from {}", path.display()))?;

        if snapshot.version > QUEUE_FORMAT_VERSION {
            bail!(
                "佇列檔版本 {} 比程式支援的版本 {} 新",
                snapshot.version,
                QUEUE_FORMAT_VERSION
            );
        }
        Ok(snapshot)
    }
}
