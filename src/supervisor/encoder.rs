use super::args::{EncoderInput, Pass, encoder_pass_args, stats_file_for};
use super::pipeline::{PipelineCoordinator, crash_diagnostic};
use super::size_estimator::{SizeEstimator, format_size};
use super::{EncodeRequest, StatusReporter, SupervisorSettings};
use crate::classifier::{
    ClassifyContext, ClipInfo, LineDelta, PassRule, SourceKind, ToolKind, ToolVersion,
    classify_line, classify_version,
};
use crate::config::ToolPaths;
use crate::error::SupervisorError;
use crate::job::{EventSink, GateRelease, JobControl, JobStatus};
use crate::process::{
    ChannelMode, ExitKind, LaunchSpec, OutputLine, OutputState, ProcessHandle,
    SIGNALLED_EXIT_CODE, StdinSource,
};
use log::{debug, error, info, warn};
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::{Duration, Instant};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(15);
/// 輸出管道關閉後等待程序結束的時間
const EXIT_GRACE: Duration = Duration::from_secs(5);
/// 監控迴圈檢查中止與暫停訊號的間隔上限
const CONTROL_TICK: Duration = Duration::from_millis(100);

/// 編碼器監控：版本檢查、逐次編碼、停滯偵測與結束碼判讀
pub struct EncodeSupervisor<'a> {
    tools: &'a ToolPaths,
    settings: SupervisorSettings,
    control: JobControl,
    reporter: StatusReporter,
    estimator: SizeEstimator,
}

/// 單次編碼的監控狀態
struct PassMonitor {
    tool: ToolKind,
    pass: Pass,
    ctx: ClassifyContext,
    fatal: Option<String>,
    idle_since: Instant,
    stall_warned: bool,
}

impl<'a> EncodeSupervisor<'a> {
    #[must_use]
    pub fn new(
        tools: &'a ToolPaths,
        settings: SupervisorSettings,
        control: JobControl,
        sink: EventSink,
    ) -> Self {
        Self {
            tools,
            settings,
            control,
            reporter: StatusReporter::new(sink),
            estimator: SizeEstimator::new(),
        }
    }

    #[must_use]
    pub const fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    fn launch_spec(&self, tool: ToolKind) -> LaunchSpec {
        LaunchSpec::new(self.tools.path_for(tool))
            .search_paths(&self.tools.extra_search_paths)
            .envs(&self.tools.extra_env)
    }

    /// 執行工具的版本探測，回傳解析出的版本
    ///
    /// 低於最低需求時失敗；高於最後測試版本時只記錄警告。
    pub fn check_version(&self, tool: ToolKind) -> Result<ToolVersion, SupervisorError> {
        let profile = tool.profile();
        let mut process = ProcessHandle::launch(
            self.launch_spec(tool)
                .args(profile.version_args)
                .channel_mode(ChannelMode::Merged),
        )?;

        let deadline = Instant::now() + VERSION_PROBE_TIMEOUT;
        let mut version = None;
        let mut first_line = None;

        loop {
            if self.control.is_cancelled() {
                debug!("版本檢查被取消 [{tool}]");
                kill_all(&mut process, None);
                return Err(SupervisorError::Aborted);
            }
            let state = process.wait_for_output(CONTROL_TICK);
            for line in process.read_lines() {
                if version.is_none() {
                    version = classify_version(profile.version_rules, &line.text);
                }
                first_line.get_or_insert(line.text);
            }
            if state == OutputState::Closed || Instant::now() >= deadline {
                break;
            }
        }

        if process.wait_with_timeout(EXIT_GRACE).is_none() {
            process.kill();
        }
        for line in process.finish_output() {
            if version.is_none() {
                version = classify_version(profile.version_rules, &line.text);
            }
            first_line.get_or_insert(line.text);
        }

        let Some(version) = version else {
            if let Some(line) = first_line {
                self.reporter.log(format!("[{tool}] {line}"));
            }
            return Err(SupervisorError::VersionProbeFailed { tool: profile.name });
        };

        let revision = version.revision();
        self.reporter
            .log(format!("{tool} 版本: {version} (r{revision})"));
        debug!("{tool} 版本 {version}");

        if revision < profile.minimum_revision {
            return Err(SupervisorError::VersionUnsupported {
                tool: profile.name,
                found: revision,
                minimum: profile.minimum_revision,
            });
        }
        if revision > profile.last_tested_revision {
            warn!("{tool} 版本 r{revision} 比已測試的版本新，可能有相容性問題");
            self.reporter.log(format!(
                "警告: {tool} r{revision} 尚未經過測試 (最後測試版本 r{})",
                profile.last_tested_revision
            ));
        }
        if version.modified {
            self.reporter.log(format!("{tool} 為修改過的版本"));
        }

        Ok(version)
    }

    /// 依序執行所有編碼
    pub fn run(&mut self, request: &EncodeRequest) -> Result<(), SupervisorError> {
        let encoder = ToolKind::encoder(request.options.encoder);
        self.reporter.log(format!(
            "來源: {}，輸出: {}",
            request.source.display(),
            request.output.display()
        ));
        self.check_version(encoder)?;
        self.bail_if_cancelled()?;

        let pipeline = match SourceKind::detect(&request.source) {
            SourceKind::Direct => None,
            SourceKind::Script(tool) => {
                self.check_version(tool)?;
                self.bail_if_cancelled()?;
                let coordinator =
                    PipelineCoordinator::new(tool, self.tools).with_priority(self.settings.priority);
                let clip = coordinator.probe(&request.source, &self.control, &self.reporter)?;
                Some((coordinator, clip))
            }
        };

        let stats_file = stats_file_for(&request.output);
        for &pass in Pass::plan(request.options.rate_control) {
            self.bail_if_cancelled()?;
            self.run_pass(
                request,
                pass,
                &stats_file,
                pipeline.as_ref().map(|(coordinator, clip)| (coordinator, clip)),
            )?;
        }

        Ok(())
    }

    /// 執行一次編碼並監控到程序結束
    pub fn run_pass(
        &mut self,
        request: &EncodeRequest,
        pass: Pass,
        stats_file: &Path,
        pipeline: Option<(&PipelineCoordinator<'_>, &ClipInfo)>,
    ) -> Result<(), SupervisorError> {
        let encoder = ToolKind::encoder(request.options.encoder);
        let input = match pipeline {
            Some((_, clip)) => EncoderInput::Pipe(clip),
            None => EncoderInput::File(&request.source),
        };
        let args = encoder_pass_args(&request.options, pass, stats_file, &request.output, input);

        let mut upstream = match pipeline {
            Some((coordinator, _)) => Some(coordinator.launch_decoder(
                &request.source,
                &request.options.custom_source_args,
            )?),
            None => None,
        };
        let stdin = match upstream.as_mut().and_then(ProcessHandle::take_stdout) {
            Some(stdout) => StdinSource::Upstream(stdout),
            None => StdinSource::Null,
        };

        if pass == Pass::Second {
            self.reporter.enter_phase(pass.status());
        }
        match pass.number() {
            Some(number) => self.reporter.log(format!("開始第 {number} 次編碼")),
            None => self.reporter.log("開始編碼"),
        }
        self.reporter.log(format!(
            "{} {}",
            self.tools.path_for(encoder).display(),
            args.iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        ));
        self.estimator.reset();

        let spec = self
            .launch_spec(encoder)
            .args(&args)
            .stdin(stdin)
            .priority(self.settings.priority);
        let mut process = match ProcessHandle::launch(spec) {
            Ok(process) => process,
            Err(e) => {
                if let Some(decoder) = upstream.as_mut() {
                    decoder.kill();
                }
                return Err(e);
            }
        };

        let total_frames = pipeline.map(|(_, clip)| clip.frame_count);
        let state = PassMonitor {
            tool: encoder,
            pass,
            ctx: ClassifyContext::new(pass.status(), total_frames),
            fatal: None,
            idle_since: Instant::now(),
            stall_warned: false,
        };
        let result = self.monitor(&mut process, upstream.as_mut(), state, &request.output);

        if let (Some((coordinator, _)), Some(decoder)) = (pipeline, upstream.as_mut()) {
            coordinator.report_decoder(decoder, &self.reporter, self.control.is_cancelled());
        }

        result
    }

    fn monitor(
        &mut self,
        process: &mut ProcessHandle,
        mut upstream: Option<&mut ProcessHandle>,
        mut state: PassMonitor,
        output: &Path,
    ) -> Result<(), SupervisorError> {
        let rules = state.tool.profile().pass_rules;
        let tick = self.settings.poll_interval.min(CONTROL_TICK);

        loop {
            if self.control.is_cancelled() {
                self.abort_processes(process, upstream.as_deref_mut());
                return Err(SupervisorError::Aborted);
            }

            if self.control.is_pause_requested() && self.reporter.status().is_running_phase() {
                self.pause_processes(process, upstream.as_deref_mut())?;
                state.idle_since = Instant::now();
                state.stall_warned = false;
                continue;
            }

            match process.wait_for_output(tick) {
                OutputState::Data => {
                    state.idle_since = Instant::now();
                    state.stall_warned = false;
                    let lines = process.read_lines();
                    self.handle_lines(rules, lines, &mut state, output);
                }
                OutputState::Idle => {
                    self.check_stall(process, upstream.as_deref_mut(), &mut state)?;
                }
                OutputState::Closed => break,
            }
        }

        if process.wait_with_timeout(EXIT_GRACE).is_none() {
            warn!("輸出已關閉但程序沒有結束，強制終止 [{}]", process.pid());
            process.kill();
            process.wait_with_timeout(EXIT_GRACE);
        }
        let lines = process.finish_output();
        self.handle_lines(rules, lines, &mut state, output);

        let code = process.exit_code().unwrap_or(SIGNALLED_EXIT_CODE);
        match ExitKind::from_code(code) {
            ExitKind::Success => {
                if let Some(line) = state.fatal {
                    return Err(SupervisorError::FatalOutput(line));
                }
                self.reporter.enter_phase(state.pass.status());
                self.reporter.progress(100);
                Ok(())
            }
            ExitKind::Failure(code) => match state.fatal {
                Some(line) => Err(SupervisorError::FatalOutput(line)),
                None => Err(SupervisorError::ExitFailure { code }),
            },
            ExitKind::ProbableCrash(code) => {
                let tool = state.tool;
                error!("{tool} 異常結束 (exit code {code})");
                self.reporter.log(crash_diagnostic(tool, code));
                Err(SupervisorError::AbnormalExit { code })
            }
        }
    }

    fn handle_lines(
        &mut self,
        rules: &[PassRule],
        lines: Vec<OutputLine>,
        state: &mut PassMonitor,
        output: &Path,
    ) {
        for line in lines {
            let delta = classify_line(rules, &line.text, &state.ctx);
            self.apply_delta(delta, state, output);
        }
    }

    fn apply_delta(&mut self, delta: LineDelta, state: &mut PassMonitor, output: &Path) {
        if let Some(status) = delta.status {
            if status == JobStatus::Indexing {
                // 只有在編碼開始前才會出現索引階段
                if matches!(
                    self.reporter.status(),
                    JobStatus::Starting | JobStatus::Indexing
                ) {
                    self.reporter.enter_phase(status);
                }
            } else {
                self.reporter.enter_phase(status);
            }
        }

        if let Some(percent) = delta.percent() {
            self.reporter.progress(percent);
            if state.pass.writes_output() && self.reporter.phase() != Some(JobStatus::Indexing) {
                if let Some(progress) = delta.progress {
                    let size = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
                    self.estimator.update(progress, size);
                }
            }
        }

        if let Some(details) = delta.details {
            let details = match self.estimator.current() {
                Some(size) if state.pass.writes_output() => {
                    format!("{details}, est. size {}", format_size(size))
                }
                _ => details,
            };
            self.reporter.details(&details);
        }

        if delta.fatal && state.fatal.is_none() {
            state.fatal = Some(delta.log.clone().unwrap_or_default());
        }

        if let Some(text) = delta.log {
            self.reporter.log(text);
        }
    }

    fn check_stall(
        &mut self,
        process: &mut ProcessHandle,
        upstream: Option<&mut ProcessHandle>,
        state: &mut PassMonitor,
    ) -> Result<(), SupervisorError> {
        let idle = state.idle_since.elapsed();
        let poll_millis = self.settings.poll_interval.as_millis().max(1);
        let empty_polls = u32::try_from(idle.as_millis() / poll_millis).unwrap_or(u32::MAX);

        // 長時間沒有任何輸出的工具仍需進入執行階段，才能被暫停或中止
        if empty_polls >= 1 && self.reporter.status() == JobStatus::Starting {
            self.reporter.enter_phase(state.pass.status());
        }

        if empty_polls >= self.settings.stall_warning_polls && !state.stall_warned {
            state.stall_warned = true;
            warn!("[{}] 已 {} 秒沒有輸出", process.label(), idle.as_secs());
            self.reporter.log(format!(
                "警告: {} 已 {} 秒沒有任何輸出，程序可能已停止回應",
                process.label(),
                idle.as_secs()
            ));
        }

        if empty_polls >= self.settings.stall_kill_polls && self.settings.abort_on_timeout {
            let secs = idle.as_secs();
            error!("[{}] 判定為死結，終止程序", process.label());
            self.reporter
                .log(format!("錯誤: {} 已 {secs} 秒沒有任何輸出，判定為死結並終止", process.label()));
            kill_all(process, upstream);
            return Err(SupervisorError::DeadlockTimeout { secs });
        }

        Ok(())
    }

    fn pause_processes(
        &mut self,
        process: &mut ProcessHandle,
        mut upstream: Option<&mut ProcessHandle>,
    ) -> Result<(), SupervisorError> {
        let Some(phase) = self.reporter.phase() else {
            return Ok(());
        };
        self.reporter.set_status(JobStatus::Pausing);

        let suspended = process.suspend().and_then(|()| match upstream.as_deref_mut() {
            Some(decoder) => decoder.suspend(),
            None => Ok(()),
        });
        if let Err(e) = suspended {
            warn!("暫停失敗: {e}");
            self.reporter.log(format!("無法暫停: {e}"));
            restore_after_failed_suspend(process, &self.reporter);
            self.control.resume();
            self.reporter.enter_phase(phase);
            return Ok(());
        }

        self.reporter.set_status(JobStatus::Paused);
        self.reporter.log("已暫停");
        info!("工作已暫停 [{}]", process.label());

        match self.control.wait_while_paused() {
            GateRelease::Cancelled => {
                self.abort_processes(process, upstream);
                Err(SupervisorError::Aborted)
            }
            GateRelease::Resumed => {
                self.reporter.set_status(JobStatus::Resuming);
                if let Some(decoder) = upstream.as_deref_mut() {
                    decoder.resume()?;
                }
                process.resume()?;
                self.reporter.enter_phase(phase);
                self.reporter.log("已恢復");
                Ok(())
            }
        }
    }

    fn abort_processes(&mut self, process: &mut ProcessHandle, upstream: Option<&mut ProcessHandle>) {
        if self.reporter.status().can_abort() {
            self.reporter.set_status(JobStatus::Aborting);
        }
        info!("中止工作，終止程序 [{}]", process.pid());
        kill_all(process, upstream);
    }

    fn bail_if_cancelled(&self) -> Result<(), SupervisorError> {
        if self.control.is_cancelled() {
            Err(SupervisorError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// 暫停只成功一半時，讓已暫停的編碼器繼續執行
fn restore_after_failed_suspend(process: &mut ProcessHandle, reporter: &StatusReporter) {
    if let Err(e) = process.resume() {
        warn!("暫停失敗後無法恢復程序 [{}]: {e}", process.pid());
        reporter.log(format!("無法恢復: {e}"));
    }
}

fn kill_all(process: &mut ProcessHandle, upstream: Option<&mut ProcessHandle>) {
    if let Some(decoder) = upstream {
        decoder.kill();
    }
    process.kill();
    process.wait_with_timeout(EXIT_GRACE);
}

/// 工作執行緒的進入點：執行整個工作並回傳最終狀態
///
/// 任何錯誤或 panic 都在這裡轉成 `Failed`（或 `Aborted`），並記錄一行說明。
pub fn run_job(
    request: &EncodeRequest,
    tools: &ToolPaths,
    settings: SupervisorSettings,
    control: &JobControl,
    sink: EventSink,
) -> JobStatus {
    let mut supervisor = EncodeSupervisor::new(tools, settings, control.clone(), sink);
    let outcome = catch_unwind(AssertUnwindSafe(|| supervisor.run(request)));

    let reporter = &mut supervisor.reporter;
    let final_status = match outcome {
        Ok(Ok(())) => {
            reporter.set_status(JobStatus::Completed);
            reporter.log("編碼完成");
            JobStatus::Completed
        }
        Ok(Err(e)) if e.is_abort() => {
            if reporter.status() == JobStatus::Starting {
                reporter.log("工作在開始編碼前被取消");
                reporter.set_status(JobStatus::Failed);
                JobStatus::Failed
            } else {
                reporter.set_status(JobStatus::Aborting);
                reporter.set_status(JobStatus::Aborted);
                reporter.log("工作已中止");
                JobStatus::Aborted
            }
        }
        Ok(Err(e)) => {
            error!("工作失敗: {e}");
            reporter.log(format!("錯誤: {e}"));
            fail(reporter)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("工作執行緒發生未預期的錯誤: {message}");
            reporter.log(format!("內部錯誤: {message}"));
            fail(reporter)
        }
    };

    if final_status != JobStatus::Completed {
        remove_empty_output(&request.output, reporter);
    }

    final_status
}

fn fail(reporter: &mut StatusReporter) -> JobStatus {
    if reporter.status() == JobStatus::Aborting {
        reporter.set_status(JobStatus::Aborted);
        return JobStatus::Aborted;
    }
    if reporter.status() == JobStatus::Paused {
        reporter.set_status(JobStatus::Resuming);
    }
    reporter.set_status(JobStatus::Failed);
    JobStatus::Failed
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// 失敗或中止時刪除 0 位元組的輸出檔；有內容的檔案保留
fn remove_empty_output(output: &Path, reporter: &StatusReporter) {
    let Ok(metadata) = fs::metadata(output) else {
        return;
    };
    if metadata.is_file() && metadata.len() == 0 {
        match fs::remove_file(output) {
            Ok(()) => reporter.log(format!("已刪除空的輸出檔 {}", output.display())),
            Err(e) => warn!("無法刪除空的輸出檔 {}: {e}", output.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }

    #[test]
    fn test_empty_output_is_removed_but_content_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let reporter = StatusReporter::new(EventSink::new(crate::job::JobId::new(), tx));

        let empty = dir.path().join("empty.mkv");
        fs::write(&empty, b"").unwrap();
        remove_empty_output(&empty, &reporter);
        assert!(!empty.exists());

        let partial = dir.path().join("partial.mkv");
        fs::write(&partial, b"data").unwrap();
        remove_empty_output(&partial, &reporter);
        assert!(partial.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_resume_after_partial_suspend_is_logged() {
        use crate::job::JobEvent;
        use crate::process::LaunchSpec;

        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = StatusReporter::new(EventSink::new(crate::job::JobId::new(), tx));
        let mut process =
            ProcessHandle::launch(LaunchSpec::new(Path::new("sleep")).args(["30"])).unwrap();
        process.suspend().unwrap();

        // 程序在暫停中被外部終止，恢復時已找不到它
        let status = std::process::Command::new("kill")
            .args(["-s", "KILL", &process.pid().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        assert!(process.wait_with_timeout(Duration::from_secs(5)).is_some());

        restore_after_failed_suspend(&mut process, &reporter);

        let logged: Vec<String> = rx
            .try_iter()
            .filter_map(|event| match event {
                JobEvent::MessageLogged { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert!(logged.iter().any(|line| line.starts_with("無法恢復")), "{logged:?}");
    }
}
