use super::StatusReporter;
use super::args::{source_pipe_args, source_probe_args};
use crate::classifier::{ClassifyContext, ClipInfo, ToolKind, classify_line, classify_probe};
use crate::config::{ProcessPriority, ToolPaths};
use crate::error::SupervisorError;
use crate::job::{JobControl, JobStatus};
use crate::process::{
    ExitKind, LaunchSpec, OutputLine, OutputState, ProcessHandle, StdoutTarget,
};
use log::{info, warn};
use std::path::Path;
use std::time::{Duration, Instant};

const PROBE_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TICK: Duration = Duration::from_millis(100);
/// 編碼器結束後等待解碼程序自行結束的時間
const DECODER_EXIT_GRACE: Duration = Duration::from_secs(5);

/// 腳本來源的解碼程序：探測影片資訊，並以管線把畫面送給編碼器
pub struct PipelineCoordinator<'a> {
    tool: ToolKind,
    tools: &'a ToolPaths,
    priority: Option<ProcessPriority>,
}

impl<'a> PipelineCoordinator<'a> {
    #[must_use]
    pub const fn new(tool: ToolKind, tools: &'a ToolPaths) -> Self {
        Self {
            tool,
            tools,
            priority: None,
        }
    }

    /// 解碼程序與編碼器使用相同的優先權
    #[must_use]
    pub const fn with_priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn tool(&self) -> ToolKind {
        self.tool
    }

    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec::new(self.tools.path_for(self.tool))
            .search_paths(&self.tools.extra_search_paths)
            .envs(&self.tools.extra_env)
    }

    /// 只解一幀以取得來源資訊；探測失敗或資訊不完整時拒絕執行管線
    pub fn probe(
        &self,
        script: &Path,
        control: &JobControl,
        reporter: &StatusReporter,
    ) -> Result<ClipInfo, SupervisorError> {
        let rules = self.tool.profile().probe_rules;
        let mut process =
            ProcessHandle::launch(self.launch_spec().args(source_probe_args(self.tool, script)))?;
        let mut info = ClipInfo::default();
        let deadline = Instant::now() + PROBE_TIMEOUT;

        let consume = |lines: Vec<OutputLine>, info: &mut ClipInfo| {
            for line in lines {
                if !classify_probe(rules, &line.text, info) {
                    reporter.log(format!("[{}] {}", self.tool, line.text));
                }
            }
        };

        loop {
            if control.is_cancelled() {
                process.kill();
                return Err(SupervisorError::Aborted);
            }
            if Instant::now() >= deadline {
                process.kill();
                return Err(SupervisorError::ProbeFailed(format!(
                    "{} 在 {} 秒內沒有完成",
                    self.tool,
                    PROBE_TIMEOUT.as_secs()
                )));
            }

            let state = process.wait_for_output(PROBE_TICK);
            consume(process.read_lines(), &mut info);
            if state == OutputState::Closed {
                break;
            }
        }

        let status = process.wait_with_timeout(DECODER_EXIT_GRACE);
        if status.is_none() {
            process.kill();
            process.wait_with_timeout(DECODER_EXIT_GRACE);
        }
        consume(process.finish_output(), &mut info);

        let code = process.exit_code().unwrap_or_default();
        if !info.is_complete() {
            return Err(SupervisorError::ProbeFailed(format!(
                "{} 沒有回報完整的影片資訊 (exit code {code})",
                self.tool
            )));
        }

        info!(
            "來源資訊: {}x{}, {}/{} fps, {} frames",
            info.width, info.height, info.fps_num, info.fps_den, info.frame_count
        );
        reporter.log(format!(
            "來源資訊: {}x{}, {}/{} fps, {} frames",
            info.width, info.height, info.fps_num, info.fps_den, info.frame_count
        ));
        Ok(info)
    }

    /// 啟動解碼程序，stdout 保留給編碼器的 stdin
    pub fn launch_decoder(
        &self,
        script: &Path,
        custom_args: &str,
    ) -> Result<ProcessHandle, SupervisorError> {
        let mut spec = self
            .launch_spec()
            .args(source_pipe_args(self.tool, script, custom_args))
            .stdout(StdoutTarget::PipeOut);
        if let Some(priority) = self.priority {
            spec = spec.priority(priority);
        }
        ProcessHandle::launch(spec)
    }

    /// 編碼器結束後收尾：等待解碼程序結束，記錄其輸出與結束碼
    pub fn report_decoder(
        &self,
        decoder: &mut ProcessHandle,
        reporter: &StatusReporter,
        aborted: bool,
    ) {
        if aborted {
            decoder.kill();
        }
        if decoder.wait_with_timeout(DECODER_EXIT_GRACE).is_none() {
            warn!("解碼程序沒有自行結束，強制終止 [{}]", decoder.pid());
            decoder.kill();
            decoder.wait_with_timeout(DECODER_EXIT_GRACE);
        }

        let rules = self.tool.profile().pass_rules;
        let ctx = ClassifyContext::new(JobStatus::Running, None);
        let mut lines = decoder.read_lines();
        lines.extend(decoder.finish_output());
        for line in lines {
            let delta = classify_line(rules, &line.text, &ctx);
            if delta.fatal {
                reporter.log(format!("[{}] 錯誤: {}", self.tool, line.text));
            } else {
                reporter.log(format!("[{}] {}", self.tool, line.text));
            }
        }

        if aborted {
            return;
        }

        let Some(code) = decoder.exit_code() else {
            return;
        };
        match ExitKind::from_code(code) {
            ExitKind::Success => {}
            ExitKind::Failure(code) => {
                warn!("{} 以錯誤碼 {code} 結束", self.tool);
                reporter.log(format!(
                    "警告: {} 以錯誤碼 {code} 結束，輸出可能不完整",
                    self.tool
                ));
            }
            ExitKind::ProbableCrash(code) => {
                warn!("{} 異常結束 (exit code {code})", self.tool);
                reporter.log(format!(
                    "警告: {} 以錯誤碼 {code} 結束，輸出可能不完整",
                    self.tool
                ));
                reporter.log(crash_diagnostic(self.tool, code));
            }
        }
    }
}

/// 結束碼超出正常範圍時的額外說明
#[must_use]
pub fn crash_diagnostic(tool: ToolKind, code: i32) -> String {
    format!(
        "{tool} 的結束碼 {code} ({:#010X}) 超出正常範圍，程序可能已崩潰",
        code as u32
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::job::{EventSink, JobEvent, JobId};
    use crossbeam_channel::unbounded;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn reporter() -> (StatusReporter, crossbeam_channel::Receiver<JobEvent>) {
        let (tx, rx) = unbounded();
        (StatusReporter::new(EventSink::new(JobId::new(), tx)), rx)
    }

    #[test]
    fn test_probe_reads_clip_info() {
        let dir = tempdir().unwrap();
        let tools = ToolPaths {
            avs2yuv: fake_tool(
                dir.path(),
                "avs2yuv",
                r#"echo "$1: 1920x1080, 24000/1001 fps, 2345 frames" >&2"#,
            ),
            ..ToolPaths::default()
        };
        let (reporter, _rx) = reporter();
        let coordinator = PipelineCoordinator::new(ToolKind::Avs2Yuv, &tools);

        let info = coordinator
            .probe(Path::new("/clips/a.avs"), &JobControl::new(), &reporter)
            .unwrap();
        assert_eq!(info.frame_count, 2345);
        assert_eq!((info.fps_num, info.fps_den), (24000, 1001));
    }

    #[test]
    fn test_empty_probe_is_refused() {
        let dir = tempdir().unwrap();
        let tools = ToolPaths {
            vspipe: fake_tool(dir.path(), "vspipe", "echo 'Script evaluation failed' >&2; exit 1"),
            ..ToolPaths::default()
        };
        let (reporter, rx) = reporter();
        let coordinator = PipelineCoordinator::new(ToolKind::VsPipe, &tools);

        let result = coordinator.probe(Path::new("/clips/a.vpy"), &JobControl::new(), &reporter);
        assert!(matches!(result, Err(SupervisorError::ProbeFailed(_))));
        assert!(rx.try_iter().any(|e| matches!(
            e,
            JobEvent::MessageLogged { ref text, .. } if text.contains("Script evaluation failed")
        )));
    }

    #[test]
    fn test_crash_diagnostic_mentions_hex_code() {
        let text = crash_diagnostic(ToolKind::X264, -1_073_741_819);
        assert!(text.contains("0xC0000005"));
    }
}
