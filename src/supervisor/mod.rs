//! 單一工作的執行：版本檢查、來源探測、逐次編碼監控與結束處理

mod args;
mod encoder;
mod pipeline;
mod reporter;
mod size_estimator;

pub use args::{
    EncoderInput, Pass, encoder_pass_args, null_device, source_pipe_args, source_probe_args,
    stats_file_for,
};
pub use encoder::{EncodeSupervisor, run_job};
pub use pipeline::PipelineCoordinator;
pub use reporter::StatusReporter;
pub use size_estimator::{MIN_PROGRESS, SizeEstimator, format_size};

use crate::config::{Preferences, ProcessPriority};
use crate::job::{EncodingOptions, Job};
use std::path::PathBuf;
use std::time::Duration;

/// 監控迴圈的逾時策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// 一次有限等待的長度
    pub poll_interval: Duration,
    /// 連續幾次沒有輸出時記錄一次警告
    pub stall_warning_polls: u32,
    /// 連續幾次沒有輸出時判定為死結
    pub stall_kill_polls: u32,
    /// 判定死結時是否終止程序
    pub abort_on_timeout: bool,
    pub priority: ProcessPriority,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&Preferences::default())
    }
}

impl From<&Preferences> for SupervisorSettings {
    fn from(preferences: &Preferences) -> Self {
        Self {
            poll_interval: preferences.poll_interval(),
            stall_warning_polls: preferences.stall_warning_polls,
            stall_kill_polls: preferences.stall_kill_polls,
            abort_on_timeout: preferences.abort_on_timeout,
            priority: preferences.process_priority,
        }
    }
}

/// 交給工作執行緒的工作內容快照
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub options: EncodingOptions,
}

impl From<&Job> for EncodeRequest {
    fn from(job: &Job) -> Self {
        Self {
            source: job.source_path().to_path_buf(),
            output: job.output_path().to_path_buf(),
            options: job.options().clone(),
        }
    }
}
