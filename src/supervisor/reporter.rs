use crate::job::{EventSink, JobStatus};

/// 記住最後一次送出的狀態、進度與細節，相同的值不重複通知
#[derive(Debug)]
pub struct StatusReporter {
    sink: EventSink,
    status: JobStatus,
    phase: Option<JobStatus>,
    percent: Option<u32>,
    details: Option<String>,
}

impl StatusReporter {
    /// 工作執行緒接手時，排程端已將工作設為 `Starting`
    #[must_use]
    pub const fn new(sink: EventSink) -> Self {
        Self {
            sink,
            status: JobStatus::Starting,
            phase: None,
            percent: None,
            details: None,
        }
    }

    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// 目前的執行階段（不含暫停、恢復等過渡狀態）
    #[must_use]
    pub const fn phase(&self) -> Option<JobStatus> {
        self.phase
    }

    #[must_use]
    pub const fn percent(&self) -> u32 {
        match self.percent {
            Some(percent) => percent,
            None => 0,
        }
    }

    pub fn set_status(&mut self, status: JobStatus) {
        if status != self.status {
            self.sink.status(status);
            self.status = status;
        }
    }

    /// 進入執行階段；換到不同的階段時進度歸零
    pub fn enter_phase(&mut self, phase: JobStatus) {
        if self.phase != Some(phase) {
            if self.percent.is_some_and(|p| p > 0) {
                self.sink.progress(0);
            }
            self.percent = None;
            self.phase = Some(phase);
        }
        self.set_status(phase);
    }

    /// 只接受遞增的進度
    pub fn progress(&mut self, percent: u32) {
        let percent = percent.min(100);
        if self.percent.is_some_and(|last| percent <= last) {
            return;
        }
        if self.percent.is_none() && percent == 0 {
            self.percent = Some(0);
            return;
        }
        self.percent = Some(percent);
        self.sink.progress(percent);
    }

    pub fn details(&mut self, details: &str) {
        if self.details.as_deref() == Some(details) {
            return;
        }
        self.details = Some(details.to_string());
        self.sink.details(details);
    }

    pub fn log(&self, text: impl Into<String>) {
        self.sink.log(text);
    }
}
