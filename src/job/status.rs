use serde::{Deserialize, Serialize};
use std::fmt;

/// 工作狀態
///
/// 狀態轉換只能沿著下列路徑進行：
/// `Enqueued → Starting → (Indexing →) Running | Running_Pass1 → Running_Pass2 → Completed | Failed`，
/// 執行階段可進入 `Pausing → Paused → Resuming → 原本的執行階段`，
/// 也可以進入 `Aborting → Aborted`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Undefined,
    Enqueued,
    Starting,
    Indexing,
    Running,
    RunningPass1,
    RunningPass2,
    Pausing,
    Paused,
    Resuming,
    Aborting,
    Aborted,
    Completed,
    Failed,
}

impl JobStatus {
    /// 是否為實際執行中的階段（會產生進度）
    #[must_use]
    pub const fn is_running_phase(self) -> bool {
        matches!(
            self,
            Self::Indexing | Self::Running | Self::RunningPass1 | Self::RunningPass2
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// 工作程序是否仍佔用一個並行名額
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Starting
                | Self::Indexing
                | Self::Running
                | Self::RunningPass1
                | Self::RunningPass2
                | Self::Pausing
                | Self::Paused
                | Self::Resuming
                | Self::Aborting
        )
    }

    #[must_use]
    pub const fn can_abort(self) -> bool {
        self.is_running_phase() || matches!(self, Self::Paused)
    }

    #[must_use]
    pub const fn can_pause(self) -> bool {
        self.is_running_phase()
    }

    #[must_use]
    pub const fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// 只有終止狀態或尚在佇列中的工作可以刪除或重新開始
    #[must_use]
    pub const fn can_delete(self) -> bool {
        self.is_terminal() || matches!(self, Self::Enqueued)
    }

    #[must_use]
    pub const fn can_restart(self) -> bool {
        self.can_delete()
    }

    /// 檢查 `self → next` 是否為合法的狀態轉換
    ///
    /// 暫停與恢復時，`Resuming` 可回到任何執行階段；
    /// 呼叫端需自行確認回到的是暫停前的那一個階段。
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use JobStatus::{
            Aborted, Aborting, Completed, Enqueued, Failed, Indexing, Paused, Pausing, Resuming,
            Running, RunningPass1, RunningPass2, Starting, Undefined,
        };

        match (self, next) {
            (Undefined, Enqueued) | (Enqueued, Starting) => true,
            (Starting, Indexing | Running | RunningPass1 | Failed) => true,
            (Indexing, Running | RunningPass1 | Failed) => true,
            (Running, Completed | Failed) => true,
            (RunningPass1, RunningPass2 | Failed) => true,
            (RunningPass2, Completed | Failed) => true,
            (from, Pausing | Aborting) if from.is_running_phase() => true,
            (Pausing, Paused | Aborting | Failed) => true,
            (Pausing, to) if to.is_running_phase() => true,
            (Paused, Resuming | Aborting) => true,
            (Resuming, Aborting | Failed) => true,
            (Resuming, to) if to.is_running_phase() => true,
            (Aborting, Aborted) => true,
            _ => false,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Enqueued => "Enqueued",
            Self::Starting => "Starting",
            Self::Indexing => "Indexing",
            Self::Running => "Running",
            Self::RunningPass1 => "Running (Pass 1)",
            Self::RunningPass2 => "Running (Pass 2)",
            Self::Pausing => "Pausing",
            Self::Paused => "Paused",
            Self::Resuming => "Resuming",
            Self::Aborting => "Aborting",
            Self::Aborted => "Aborted",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 檢查一串觀察到的狀態是否為合法路徑，並且暫停後恢復到原本的執行階段
#[must_use]
pub fn is_valid_path(statuses: &[JobStatus]) -> bool {
    let mut paused_from: Option<JobStatus> = None;

    for pair in statuses.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if !from.can_transition_to(to) {
            return false;
        }

        if to == JobStatus::Pausing {
            paused_from = Some(from);
        }
        if to.is_running_phase() && matches!(from, JobStatus::Resuming | JobStatus::Pausing) {
            if paused_from != Some(to) {
                return false;
            }
            paused_from = None;
        }
    }

    true
}
