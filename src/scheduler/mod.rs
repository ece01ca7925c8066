//! 工作佇列：依序保存工作、控制並行上限、自動執行下一個工作

mod queue_file;

pub use queue_file::{QUEUE_FORMAT_VERSION, QueueEntry, QueueSnapshot};

use crate::config::{Preferences, ToolPaths};
use crate::error::SchedulerError;
use crate::job::{EncodingOptions, EventSink, Job, JobControl, JobEvent, JobId, JobStatus};
use crate::supervisor::{EncodeRequest, SupervisorSettings, run_job};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 佇列中移動工作的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

struct JobEntry {
    job: Job,
    control: JobControl,
    worker: Option<JoinHandle<JobStatus>>,
}

impl JobEntry {
    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(status) => debug!("工作執行緒結束 [{}]: {status}", self.job.id().short()),
                Err(_) => error!("工作執行緒異常結束 [{}]", self.job.id().short()),
            }
        }
    }
}

type ShutdownHandler = Box<dyn FnMut() + Send>;

pub struct Scheduler {
    entries: Vec<JobEntry>,
    preferences: Preferences,
    tools: ToolPaths,
    sender: Sender<JobEvent>,
    receiver: Receiver<JobEvent>,
    listeners: Vec<Sender<JobEvent>>,
    shutdown_handler: ShutdownHandler,
    shutdown_triggered: bool,
}

impl Scheduler {
    #[must_use]
    pub fn new(preferences: Preferences, tools: ToolPaths) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            entries: Vec::new(),
            preferences,
            tools,
            sender,
            receiver,
            listeners: Vec::new(),
            shutdown_handler: Box::new(|| info!("所有工作已完成，觸發關機程序")),
            shutdown_triggered: false,
        }
    }

    #[must_use]
    pub const fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn set_preferences(&mut self, mut preferences: Preferences) {
        preferences.normalize();
        if preferences.shutdown_on_completion && !self.preferences.shutdown_on_completion {
            self.shutdown_triggered = false;
        }
        self.preferences = preferences;
    }

    #[must_use]
    pub const fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn set_tools(&mut self, tools: ToolPaths) {
        self.tools = tools;
    }

    /// 所有工作通知的副本都會送到回傳的接收端
    pub fn subscribe(&mut self) -> Receiver<JobEvent> {
        let (sender, receiver) = unbounded();
        self.listeners.push(sender);
        receiver
    }

    pub fn set_shutdown_handler(&mut self, handler: ShutdownHandler) {
        self.shutdown_handler = handler;
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().map(|entry| &entry.job)
    }

    #[must_use]
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.entries
            .iter()
            .find(|entry| entry.job.id() == id)
            .map(|entry| &entry.job)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 佔用並行名額的工作數
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.job.status().is_active())
            .count()
    }

    #[must_use]
    pub fn has_active_jobs(&self) -> bool {
        self.active_count() > 0 || self.entries.iter().any(JobEntry::worker_alive)
    }

    fn index_of(&self, id: JobId) -> Result<usize, SchedulerError> {
        self.entries
            .iter()
            .position(|entry| entry.job.id() == id)
            .ok_or(SchedulerError::NotFound(id))
    }

    /// 加入工作並指定不重複的顯示名稱
    pub fn insert(&mut self, job: Job) -> JobId {
        let index = self.entries.len();
        self.insert_at(index, job)
    }

    fn insert_at(&mut self, index: usize, mut job: Job) -> JobId {
        job.display_name = self.unique_display_name(&job);
        let id = job.id();
        info!("加入工作 {} [{}]", job.display_name, id.short());
        self.entries.insert(
            index.min(self.entries.len()),
            JobEntry {
                job,
                control: JobControl::new(),
                worker: None,
            },
        );
        id
    }

    fn unique_display_name(&self, job: &Job) -> String {
        let stem = job
            .source_path()
            .file_stem()
            .map_or_else(|| "untitled".to_string(), |s| s.to_string_lossy().to_string());
        let base = format!("{stem} ({})", job.options().rate_control_summary());

        let taken = |name: &str| self.entries.iter().any(|e| e.job.display_name == name);
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base} #{n}"))
            .find(|name| !taken(name))
            .unwrap_or(base)
    }

    /// 外部送來的新工作；`run_immediately` 只在並行名額未滿時立即開始
    pub fn submit_job(
        &mut self,
        source: &Path,
        output: &Path,
        options: EncodingOptions,
        run_immediately: bool,
    ) -> JobId {
        let id = self.insert(Job::new(source, output, options));
        if run_immediately && self.active_count() < self.preferences.max_concurrent_jobs {
            if let Err(e) = self.start(id) {
                warn!("無法立即開始工作 [{}]: {e}", id.short());
            }
        }
        id
    }

    /// `Enqueued → Starting`，並在獨立的執行緒上執行工作
    pub fn start(&mut self, id: JobId) -> Result<(), SchedulerError> {
        let index = self.index_of(id)?;
        let status = self.entries[index].job.status();
        if status != JobStatus::Enqueued {
            return Err(SchedulerError::InvalidState {
                operation: "start",
                status,
            });
        }
        let limit = self.preferences.max_concurrent_jobs;
        if self.active_count() >= limit {
            return Err(SchedulerError::ConcurrencyLimit(limit));
        }

        let control = JobControl::new();
        let request = EncodeRequest::from(&self.entries[index].job);
        let tools = self.tools.clone();
        let settings = SupervisorSettings::from(&self.preferences);
        let sink = EventSink::new(id, self.sender.clone());
        let worker_control = control.clone();

        let worker = thread::Builder::new()
            .name(format!("job-{}", id.short()))
            .spawn(move || run_job(&request, &tools, settings, &worker_control, sink))
            .map_err(|e| SchedulerError::WorkerSpawn(e.to_string()))?;

        let entry = &mut self.entries[index];
        entry.control = control;
        entry.worker = Some(worker);
        entry.job.set_status(JobStatus::Starting);
        info!("開始工作 {} [{}]", entry.job.display_name, id.short());
        self.notify(&JobEvent::StatusChanged {
            job_id: id,
            status: JobStatus::Starting,
        });
        Ok(())
    }

    pub fn pause(&mut self, id: JobId) -> Result<(), SchedulerError> {
        let entry = self.checked_entry(id, "pause", JobStatus::can_pause)?;
        entry.control.pause();
        Ok(())
    }

    pub fn resume(&mut self, id: JobId) -> Result<(), SchedulerError> {
        let entry = self.checked_entry(id, "resume", JobStatus::can_resume)?;
        entry.control.resume();
        Ok(())
    }

    pub fn abort(&mut self, id: JobId) -> Result<(), SchedulerError> {
        let entry = self.checked_entry(id, "abort", JobStatus::can_abort)?;
        entry.control.abort();
        Ok(())
    }

    /// 只能刪除終止狀態或尚未開始的工作，且工作執行緒已結束
    pub fn delete(&mut self, id: JobId) -> Result<Job, SchedulerError> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        let status = entry.job.status();
        if !status.can_delete() {
            return Err(SchedulerError::InvalidState {
                operation: "delete",
                status,
            });
        }
        if entry.worker_alive() {
            return Err(SchedulerError::WorkerAlive);
        }
        entry.reap();

        let entry = self.entries.remove(index);
        info!("刪除工作 {} [{}]", entry.job.display_name, id.short());
        Ok(entry.job)
    }

    /// 以相同的來源、輸出與編碼選項建立新工作，放在原工作後面
    pub fn restart(&mut self, id: JobId) -> Result<JobId, SchedulerError> {
        let index = self.index_of(id)?;
        let original = &self.entries[index].job;
        let status = original.status();
        if !status.can_restart() {
            return Err(SchedulerError::InvalidState {
                operation: "restart",
                status,
            });
        }

        let job = Job::new(
            original.source_path(),
            original.output_path(),
            original.options().clone(),
        );
        Ok(self.insert_at(index + 1, job))
    }

    /// 回傳是否真的移動了
    pub fn move_job(&mut self, id: JobId, direction: MoveDirection) -> Result<bool, SchedulerError> {
        let index = self.index_of(id)?;
        let target = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < self.entries.len() => index + 1,
            _ => return Ok(false),
        };
        self.entries.swap(index, target);
        Ok(true)
    }

    fn checked_entry(
        &mut self,
        id: JobId,
        operation: &'static str,
        allowed: fn(JobStatus) -> bool,
    ) -> Result<&mut JobEntry, SchedulerError> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        let status = entry.job.status();
        if allowed(status) {
            Ok(entry)
        } else {
            Err(SchedulerError::InvalidState { operation, status })
        }
    }

    /// 處理工作執行緒送來的通知，最多等待 `timeout`，回傳處理的事件數
    ///
    /// 工作進入終止狀態時回收執行緒，並依設定自動開始下一個工作。
    pub fn process_events(&mut self, timeout: Duration) -> usize {
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(event) => event,
            Err(_) => return 0,
        };

        let mut handled = 0;
        let mut next = Some(first);
        while let Some(event) = next {
            self.handle_event(&event);
            handled += 1;
            next = self.receiver.try_recv().ok();
        }
        handled
    }

    fn handle_event(&mut self, event: &JobEvent) {
        let id = event.job_id();
        let Some(entry) = self.entries.iter_mut().find(|e| e.job.id() == id) else {
            debug!("收到已刪除工作的通知 [{}]", id.short());
            return;
        };

        let changed = entry.job.apply(event);
        let finished = changed && entry.job.status().is_terminal();
        if finished {
            entry.reap();
            info!(
                "工作結束 {} [{}]: {}",
                entry.job.display_name,
                id.short(),
                entry.job.status()
            );
        }

        self.notify(event);

        if finished {
            self.on_job_finished();
        }
    }

    fn notify(&mut self, event: &JobEvent) {
        self.listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    fn on_job_finished(&mut self) {
        if self.preferences.auto_run_next {
            self.start_next_jobs();
        }

        let pending = self
            .entries
            .iter()
            .any(|entry| entry.job.status() == JobStatus::Enqueued);
        if !pending
            && self.active_count() == 0
            && self.preferences.shutdown_on_completion
            && !self.shutdown_triggered
        {
            self.shutdown_triggered = true;
            (self.shutdown_handler)();
        }
    }

    /// 在並行名額內依佇列順序開始 `Enqueued` 工作，回傳開始的數量
    pub fn start_next_jobs(&mut self) -> usize {
        let mut started = 0;
        while self.active_count() < self.preferences.max_concurrent_jobs {
            let Some(id) = self
                .entries
                .iter()
                .find(|entry| entry.job.status() == JobStatus::Enqueued)
                .map(|entry| entry.job.id())
            else {
                break;
            };
            if let Err(e) = self.start(id) {
                error!("無法開始工作 [{}]: {e}", id.short());
                break;
            }
            started += 1;
        }
        started
    }

    /// 持續處理通知直到沒有執行中的工作，或超過 `timeout`
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.has_active_jobs() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.process_events((deadline - now).min(Duration::from_millis(100)));
        }
        self.process_events(Duration::ZERO);
        true
    }

    /// 中止所有工作並等待執行緒結束
    pub fn abort_all(&mut self) {
        let auto_run = self.preferences.auto_run_next;
        self.preferences.auto_run_next = false;

        for entry in &self.entries {
            if entry.worker.is_some() {
                entry.control.abort();
            }
        }
        for entry in &mut self.entries {
            entry.reap();
        }
        while self.process_events(Duration::ZERO) > 0 {}

        self.preferences.auto_run_next = auto_run;
        info!("已中止所有工作");
    }

    /// 保存等待中的工作，回傳保存的數量
    ///
    /// 執行中或暫停中的工作不保存。
    pub fn save_queue(&self, path: &Path) -> Result<usize> {
        let snapshot = QueueSnapshot::from_jobs(
            self.jobs()
                .filter(|job| job.status() == JobStatus::Enqueued),
        );
        snapshot.save(path)?;
        info!("已保存 {} 個工作到 {}", snapshot.jobs.len(), path.display());
        Ok(snapshot.jobs.len())
    }

    /// 還原佇列，所有工作都回到 `Enqueued`，回傳還原的數量
    pub fn load_queue(&mut self, path: &Path) -> Result<usize> {
        let jobs = QueueSnapshot::load(path)?.into_jobs();
        let count = jobs.len();
        for job in jobs {
            self.insert(job);
        }
        if count > 0 {
            info!("已從 {} 還原 {count} 個工作", path.display());
        }
        Ok(count)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.entries.iter().any(JobEntry::worker_alive) {
            warn!("排程器結束時仍有工作在執行，全部中止");
            self.abort_all();
        }
    }
}
