use super::exit::exit_code;
use super::group;
use super::line_stream::LineStream;
use super::tree::{kill_descendants, signal_tree};
use crate::config::ProcessPriority;
use crate::error::SupervisorError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, warn};
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::Signal;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Linux 在另一個執行緒 fork 時仍持有可寫入 fd 會回報 ETXTBSY
const ETXTBSY: i32 = 26;
const SPAWN_RETRIES: u32 = 3;

/// stdout / stderr 是否合併成同一個輸出來源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    #[default]
    Merged,
    Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTag {
    Merged,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamTag,
    pub text: String,
}

/// 子程序 stdout 的去向
#[derive(Debug, Default)]
pub enum StdoutTarget {
    /// 讀取並切成文字行
    #[default]
    Capture,
    /// 保留給下游程序的 stdin（管線）
    PipeOut,
}

/// 子程序 stdin 的來源
#[derive(Debug, Default)]
pub enum StdinSource {
    #[default]
    Null,
    /// 直接接上上游程序的 stdout，不經過任何緩衝
    Upstream(ChildStdout),
}

/// 啟動參數
#[derive(Debug, Default)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub extra_env: Vec<(String, String)>,
    pub extra_search_paths: Vec<PathBuf>,
    pub channel_mode: ChannelMode,
    pub stdin: StdinSource,
    pub stdout: StdoutTarget,
    pub priority: Option<ProcessPriority>,
}

impl LaunchSpec {
    #[must_use]
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn search_paths(mut self, paths: &[PathBuf]) -> Self {
        self.extra_search_paths.extend_from_slice(paths);
        self
    }

    #[must_use]
    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.extra_env.extend_from_slice(vars);
        self
    }

    #[must_use]
    pub const fn channel_mode(mut self, mode: ChannelMode) -> Self {
        self.channel_mode = mode;
        self
    }

    #[must_use]
    pub fn stdin(mut self, source: StdinSource) -> Self {
        self.stdin = source;
        self
    }

    #[must_use]
    pub fn stdout(mut self, target: StdoutTarget) -> Self {
        self.stdout = target;
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    fn build_command(&self) -> Result<Command, SupervisorError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        if !self.extra_search_paths.is_empty() {
            let existing = std::env::var_os("PATH").unwrap_or_default();
            let joined = std::env::join_paths(
                self.extra_search_paths
                    .iter()
                    .cloned()
                    .chain(std::env::split_paths(&existing)),
            )
            .map_err(|e| {
                SupervisorError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;
            command.env("PATH", joined);
        }

        for (key, value) in &self.extra_env {
            command.env(key, value);
        }

        command.stderr(Stdio::piped());
        command.stdout(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // 獨立的程序群組，終端機的 Ctrl-C 由排程端統一處理
            command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            let class = self
                .priority
                .map_or(0, ProcessPriority::windows_priority_class);
            command.creation_flags(CREATE_NO_WINDOW | class);
        }

        Ok(command)
    }
}

/// 一個受監控的子程序及其尚未讀取的輸出
pub struct ProcessHandle {
    child: Child,
    label: String,
    receiver: Receiver<(StreamTag, Vec<u8>)>,
    streams: Vec<(StreamTag, LineStream)>,
    readers: Vec<JoinHandle<()>>,
    piped_stdout: Option<ChildStdout>,
    suspended: bool,
    exit_status: Option<ExitStatus>,
}

/// 一次有限等待的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// 收到新資料
    Data,
    /// 逾時內沒有任何資料
    Idle,
    /// 所有輸出管道都已關閉
    Closed,
}

impl ProcessHandle {
    pub fn launch(spec: LaunchSpec) -> Result<Self, SupervisorError> {
        let mut command = spec.build_command()?;
        #[cfg(unix)]
        let niceness = spec.priority;
        let LaunchSpec {
            program,
            channel_mode,
            stdin,
            stdout,
            ..
        } = spec;

        match stdin {
            StdinSource::Null => {
                command.stdin(Stdio::null());
            }
            StdinSource::Upstream(upstream) => {
                command.stdin(Stdio::from(upstream));
            }
        }

        let mut child = spawn_with_retry(&mut command).map_err(|source| {
            SupervisorError::Launch {
                program: program.clone(),
                source,
            }
        })?;

        let label = program
            .file_stem()
            .map_or_else(|| program.display().to_string(), |s| s.to_string_lossy().to_string());
        debug!("已啟動程序 [{}] {}", child.id(), label);
        group::register(child.id());
        #[cfg(unix)]
        if let Some(priority) = niceness {
            apply_niceness(child.id(), priority);
        }

        let (sender, receiver) = unbounded();
        let mut readers = Vec::new();
        let mut streams = Vec::new();
        let (stdout_tag, stderr_tag) = match channel_mode {
            ChannelMode::Merged => (StreamTag::Merged, StreamTag::Merged),
            ChannelMode::Separate => (StreamTag::Stdout, StreamTag::Stderr),
        };

        let mut piped_stdout = None;
        match stdout {
            StdoutTarget::Capture => {
                if let Some(out) = child.stdout.take() {
                    readers.push(spawn_reader(out, stdout_tag, sender.clone(), &label));
                    streams.push((stdout_tag, LineStream::new()));
                }
            }
            StdoutTarget::PipeOut => piped_stdout = child.stdout.take(),
        }

        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, stderr_tag, sender, &label));
            if !streams.iter().any(|(tag, _)| *tag == stderr_tag) {
                streams.push((stderr_tag, LineStream::new()));
            }
        }

        Ok(Self {
            child,
            label,
            receiver,
            streams,
            readers,
            piped_stdout,
            suspended: false,
            exit_status: None,
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 取出保留給下游程序的 stdout
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.piped_stdout.take()
    }

    /// 最多等待 `timeout` 取得新的輸出
    pub fn wait_for_output(&mut self, timeout: Duration) -> OutputState {
        match self.receiver.recv_timeout(timeout) {
            Ok((tag, bytes)) => {
                self.push(tag, &bytes);
                while let Ok((tag, bytes)) = self.receiver.try_recv() {
                    self.push(tag, &bytes);
                }
                OutputState::Data
            }
            Err(RecvTimeoutError::Timeout) => OutputState::Idle,
            Err(RecvTimeoutError::Disconnected) => OutputState::Closed,
        }
    }

    #[must_use]
    pub fn has_pending_output(&self) -> bool {
        !self.receiver.is_empty() || self.streams.iter().any(|(_, s)| s.has_pending())
    }

    /// 取出目前所有完整的行
    pub fn read_lines(&mut self) -> Vec<OutputLine> {
        self.streams
            .iter_mut()
            .flat_map(|(tag, stream)| {
                let tag = *tag;
                stream
                    .drain_lines()
                    .into_iter()
                    .map(move |text| OutputLine { stream: tag, text })
            })
            .collect()
    }

    /// 程序結束後收集剩下的輸出，包含未以換行結尾的片段
    pub fn finish_output(&mut self) -> Vec<OutputLine> {
        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                warn!("輸出讀取執行緒異常結束 [{}]", self.label);
            }
        }
        while let Ok((tag, bytes)) = self.receiver.try_recv() {
            self.push(tag, &bytes);
        }

        self.streams
            .iter_mut()
            .flat_map(|(tag, stream)| {
                let tag = *tag;
                stream
                    .finish()
                    .into_iter()
                    .map(move |text| OutputLine { stream: tag, text })
            })
            .collect()
    }

    /// 暫停整棵程序樹（POSIX 上為 SIGSTOP）
    pub fn suspend(&mut self) -> Result<(), SupervisorError> {
        if self.suspended {
            return Ok(());
        }
        signal_tree(self.pid(), Signal::Stop).map_err(|reason| SupervisorError::Suspend {
            pid: self.pid(),
            reason,
        })?;
        self.suspended = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SupervisorError> {
        if !self.suspended {
            return Ok(());
        }
        signal_tree(self.pid(), Signal::Continue).map_err(|reason| {
            SupervisorError::Suspend {
                pid: self.pid(),
                reason,
            }
        })?;
        self.suspended = false;
        Ok(())
    }

    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// 終止程序及其子孫程序
    ///
    /// POSIX 上先終止整個程序群組，已被移交給 init 的孫程序也包含在內。
    pub fn kill(&mut self) {
        #[cfg(unix)]
        if group::kill_group(self.pid()) {
            debug!("已終止程序群組 [{}]", self.pid());
        }
        if self.has_exited() {
            return;
        }
        let killed = kill_descendants(self.pid());
        if killed > 0 {
            debug!("已終止 {} 個子程序 [{}]", killed, self.label);
        }
        if let Err(e) = self.child.kill() {
            debug!("終止程序失敗 [{}]: {e}", self.pid());
        }
        self.suspended = false;
    }

    /// 非阻塞檢查是否已結束
    pub fn has_exited(&mut self) -> bool {
        self.try_wait().is_some()
    }

    fn try_wait(&mut self) -> Option<ExitStatus> {
        if self.exit_status.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.exit_status = status,
                Err(e) => warn!("無法檢查程序狀態 [{}]: {e}", self.pid()),
            }
        }
        self.exit_status
    }

    /// 最多等待 `timeout` 讓程序結束
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait() {
                return Some(status);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// 已結束時回傳結束碼
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.map(exit_code)
    }

    fn push(&mut self, tag: StreamTag, bytes: &[u8]) {
        if let Some((_, stream)) = self.streams.iter_mut().find(|(t, _)| *t == tag) {
            stream.push(bytes);
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("程序仍在執行，強制終止 [{}] {}", self.pid(), self.label);
            self.kill();
            let _ = self.child.wait();
        }
        group::unregister(self.pid());
    }
}

/// 以 `renice` 調整整個程序群組的 nice 值
#[cfg(unix)]
fn apply_niceness(pgid: u32, priority: ProcessPriority) {
    if priority == ProcessPriority::Normal {
        return;
    }
    let niceness = priority.niceness().to_string();
    let target = pgid.to_string();
    let result = Command::new("renice")
        .args(["-n", &niceness, "-g", &target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => {
            debug!("程序群組 [{pgid}] 的優先權設為 {}", priority.label());
        }
        Ok(status) => warn!("無法設定程序優先權 {} [{pgid}]: {status}", priority.label()),
        Err(e) => warn!("無法設定程序優先權 {} [{pgid}]: {e}", priority.label()),
    }
}

fn spawn_with_retry(command: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempt < SPAWN_RETRIES => {
                attempt += 1;
                thread::sleep(Duration::from_millis(50));
            }
            result => return result,
        }
    }
}

fn spawn_reader<R>(
    mut source: R,
    tag: StreamTag,
    sender: Sender<(StreamTag, Vec<u8>)>,
    label: &str,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    let label = label.to_string();
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if sender.send((tag, buffer[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("讀取輸出失敗 [{label}]: {e}");
                    break;
                }
            }
        }
    })
}
