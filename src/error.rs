use crate::job::{JobId, JobStatus};
use std::path::PathBuf;
use thiserror::Error;

/// 工作執行緒內部的錯誤分類，全部在工作邊界轉成 `Failed` 或 `Aborted`
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("無法啟動程序 {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} 版本過舊: r{found}，最低需求 r{minimum}")]
    VersionUnsupported {
        tool: &'static str,
        found: u32,
        minimum: u32,
    },

    #[error("無法判斷 {tool} 的版本")]
    VersionProbeFailed { tool: &'static str },

    #[error("來源探測失敗: {0}")]
    ProbeFailed(String),

    #[error("程序已 {secs} 秒沒有任何輸出，判定為死結")]
    DeadlockTimeout { secs: u64 },

    #[error("程序異常結束 (exit code {code})，可能已崩潰")]
    AbnormalExit { code: i32 },

    #[error("程序以錯誤碼結束 (exit code {code})")]
    ExitFailure { code: i32 },

    #[error("程序回報致命錯誤: {0}")]
    FatalOutput(String),

    #[error("使用者中止")]
    Aborted,

    #[error("無法暫停/恢復程序 [{pid}]: {reason}")]
    Suspend { pid: u32, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// 排程端操作的錯誤
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("找不到工作 {0}")]
    NotFound(JobId),

    #[error("工作狀態 {status} 不允許執行 {operation}")]
    InvalidState {
        operation: &'static str,
        status: JobStatus,
    },

    #[error("工作執行緒仍在執行中")]
    WorkerAlive,

    #[error("已達同時執行上限 ({0})")]
    ConcurrencyLimit(usize),

    #[error("無法建立工作執行緒: {0}")]
    WorkerSpawn(String),
}
