use crate::job::{Job, JobEvent, JobId, JobStatus};
use crate::scheduler::Scheduler;
use crate::signal::InterruptSignal;
use console::{Term, style};
use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use std::collections::HashMap;
use std::time::Duration;

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// 監看結束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// 所有工作都已結束
    Idle,
    /// 使用者按下 Ctrl-C，執行中的工作已全部中止
    Interrupted,
}

/// 以進度條顯示佇列中執行中的工作
pub struct QueueConsole {
    events: Receiver<JobEvent>,
    signal: InterruptSignal,
    progress: MultiProgress,
    bars: HashMap<JobId, ProgressBar>,
}

impl QueueConsole {
    pub fn new(scheduler: &mut Scheduler, signal: InterruptSignal) -> Self {
        Self {
            events: scheduler.subscribe(),
            signal,
            progress: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    /// 持續處理工作通知直到佇列閒置或收到中斷
    pub fn monitor(&mut self, scheduler: &mut Scheduler) -> MonitorOutcome {
        for job in scheduler.jobs().filter(|job| job.status().is_active()) {
            self.bar_for(job);
        }

        let _watching = self.signal.watch();
        let outcome = loop {
            if self.signal.is_raised() {
                scheduler.abort_all();
                self.signal.reset();
                self.drain(scheduler);
                break MonitorOutcome::Interrupted;
            }

            scheduler.process_events(REFRESH_INTERVAL);
            self.drain(scheduler);

            if !scheduler.has_active_jobs() {
                break MonitorOutcome::Idle;
            }
        };

        for (_, bar) in self.bars.drain() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        outcome
    }

    /// 在選單之間呼叫，讓背景工作的通知不會堆積
    pub fn catch_up(&mut self, scheduler: &mut Scheduler) {
        scheduler.process_events(Duration::ZERO);
        while self.events.try_recv().is_ok() {}
    }

    fn drain(&mut self, scheduler: &Scheduler) {
        while let Ok(event) = self.events.try_recv() {
            let Some(job) = scheduler.job(event.job_id()) else {
                continue;
            };
            let bar = self.bar_for(job);

            match &event {
                JobEvent::StatusChanged { status, .. } => {
                    bar.set_prefix(format!("{:<16}", status.label()));
                    if status.is_terminal() {
                        let message = format!("{} {}", job.display_name, style(status).bold());
                        bar.finish_with_message(message);
                        info!("{} 結束: {status}", job.display_name);
                        if scheduler.preferences().enable_sounds {
                            let _ = Term::stderr().write_str("\x07");
                        }
                    }
                }
                JobEvent::ProgressChanged { percent, .. } => {
                    bar.set_position(u64::from(*percent));
                }
                JobEvent::DetailsChanged { details, .. } => {
                    bar.set_message(format!("{} {}", job.display_name, style(details).dim()));
                }
                JobEvent::MessageLogged { .. } => {}
            }
        }
    }

    fn bar_for(&mut self, job: &Job) -> ProgressBar {
        if let Some(bar) = self.bars.get(&job.id()) {
            return bar.clone();
        }

        let bar = self.progress.add(ProgressBar::new(100));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.cyan} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_prefix(format!("{:<16}", job.status().label()));
        bar.set_position(u64::from(job.progress()));
        bar.set_message(job.display_name.clone());
        self.bars.insert(job.id(), bar.clone());
        bar
    }
}

/// 列出佇列內容
pub fn print_queue(scheduler: &Scheduler) {
    if scheduler.is_empty() {
        println!("{}", style("佇列是空的").yellow());
        return;
    }

    println!("{}", style("=== 工作佇列 ===").cyan().bold());
    for (index, job) in scheduler.jobs().enumerate() {
        let status = match job.status() {
            JobStatus::Completed => style(job.status().label()).green(),
            JobStatus::Failed | JobStatus::Aborted => style(job.status().label()).red(),
            status if status.is_active() => style(status.label()).cyan(),
            status => style(status.label()).dim(),
        };
        println!(
            "  {:>2}. {:<40} {:<18} {:>3}%",
            index + 1,
            job.display_name,
            status,
            job.progress()
        );
        if !job.details().is_empty() {
            println!("      {}", style(job.details()).dim());
        }
    }
    println!(
        "{}",
        style(format!(
            "共 {} 個工作，執行中 {} 個",
            scheduler.len(),
            scheduler.active_count()
        ))
        .dim()
    );
}
