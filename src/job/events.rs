use super::JobStatus;
use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 前 8 碼，用於執行緒名稱與日誌
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 工作通知，由工作執行緒送出、排程端依序消費
///
/// 同一個工作的事件順序保持不變，不同工作之間沒有順序保證。
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    StatusChanged {
        job_id: JobId,
        status: JobStatus,
    },
    ProgressChanged {
        job_id: JobId,
        percent: u32,
    },
    DetailsChanged {
        job_id: JobId,
        details: String,
    },
    MessageLogged {
        job_id: JobId,
        timestamp: DateTime<Local>,
        text: String,
    },
}

impl JobEvent {
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::StatusChanged { job_id, .. }
            | Self::ProgressChanged { job_id, .. }
            | Self::DetailsChanged { job_id, .. }
            | Self::MessageLogged { job_id, .. } => *job_id,
        }
    }
}

/// 綁定單一工作的事件發送端
///
/// 接收端已關閉時直接丟棄事件，工作執行緒不因此中斷。
#[derive(Debug, Clone)]
pub struct EventSink {
    job_id: JobId,
    sender: Sender<JobEvent>,
}

impl EventSink {
    #[must_use]
    pub const fn new(job_id: JobId, sender: Sender<JobEvent>) -> Self {
        Self { job_id, sender }
    }

    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn status(&self, status: JobStatus) {
        self.send(JobEvent::StatusChanged {
            job_id: self.job_id,
            status,
        });
    }

    pub fn progress(&self, percent: u32) {
        self.send(JobEvent::ProgressChanged {
            job_id: self.job_id,
            percent: percent.min(100),
        });
    }

    pub fn details(&self, details: impl Into<String>) {
        self.send(JobEvent::DetailsChanged {
            job_id: self.job_id,
            details: details.into(),
        });
    }

    pub fn log(&self, text: impl Into<String>) {
        self.send(JobEvent::MessageLogged {
            job_id: self.job_id,
            timestamp: Local::now(),
            text: text.into(),
        });
    }

    fn send(&self, event: JobEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("事件接收端已關閉 [{}]", self.job_id.short());
        }
    }
}
