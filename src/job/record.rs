use super::{EncodingOptions, JobEvent, JobId, JobStatus};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// 一行帶時間戳記的工作日誌，寫入後不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

/// 佇列中的一個編碼工作
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    pub display_name: String,
    source_path: PathBuf,
    output_path: PathBuf,
    options: EncodingOptions,
    status: JobStatus,
    progress: u32,
    details: String,
    log: Vec<LogLine>,
}

impl Job {
    #[must_use]
    pub fn new(source_path: &Path, output_path: &Path, options: EncodingOptions) -> Self {
        Self {
            id: JobId::new(),
            display_name: String::new(),
            source_path: source_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            options,
            status: JobStatus::Enqueued,
            progress: 0,
            details: String::new(),
            log: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub const fn options(&self) -> &EncodingOptions {
        &self.options
    }

    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    #[must_use]
    pub const fn progress(&self) -> u32 {
        self.progress
    }

    #[must_use]
    pub fn details(&self) -> &str {
        &self.details
    }

    #[must_use]
    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    /// 由排程端直接設定狀態（僅用於 `Enqueued → Starting`）
    pub(crate) fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    /// 套用工作執行緒送來的事件，回傳狀態是否改變
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        match event {
            JobEvent::StatusChanged { status, .. } => {
                if !self.status.can_transition_to(*status) {
                    log::warn!(
                        "非預期的狀態轉換 [{}]: {} -> {}",
                        self.id.short(),
                        self.status,
                        status
                    );
                }
                let changed = self.status != *status;
                self.status = *status;
                changed
            }
            JobEvent::ProgressChanged { percent, .. } => {
                self.progress = *percent;
                false
            }
            JobEvent::DetailsChanged { details, .. } => {
                self.details.clone_from(details);
                false
            }
            JobEvent::MessageLogged {
                timestamp, text, ..
            } => {
                self.log.push(LogLine {
                    timestamp: *timestamp,
                    text: text.clone(),
                });
                false
            }
        }
    }

    /// 以 `[HH:MM:SS] 訊息` 格式輸出完整日誌
    #[must_use]
    pub fn log_text(&self) -> String {
        self.log
            .iter()
            .map(|line| format!("[{}] {}", line.timestamp.format("%H:%M:%S"), line.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_enqueued() {
        let job = Job::new(
            Path::new("/videos/a.avs"),
            Path::new("/videos/a.mkv"),
            EncodingOptions::default(),
        );
        assert_eq!(job.status(), JobStatus::Enqueued);
        assert_eq!(job.progress(), 0);
        assert!(job.log().is_empty());
    }

    #[test]
    fn test_apply_events_updates_state_and_log() {
        let mut job = Job::new(
            Path::new("/videos/a.avs"),
            Path::new("/videos/a.mkv"),
            EncodingOptions::default(),
        );
        let job_id = job.id();
        job.set_status(JobStatus::Starting);

        assert!(job.apply(&JobEvent::StatusChanged {
            job_id,
            status: JobStatus::Running,
        }));
        job.apply(&JobEvent::ProgressChanged {
            job_id,
            percent: 42,
        });
        job.apply(&JobEvent::DetailsChanged {
            job_id,
            details: "42/100 frames".to_string(),
        });
        job.apply(&JobEvent::MessageLogged {
            job_id,
            timestamp: Local::now(),
            text: "x264 [info]: profile High".to_string(),
        });

        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.progress(), 42);
        assert_eq!(job.details(), "42/100 frames");
        assert_eq!(job.log().len(), 1);
        assert!(job.log_text().ends_with("x264 [info]: profile High"));
    }
}
