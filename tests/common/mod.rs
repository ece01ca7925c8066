//! 整合測試共用的假工具與事件整理函式
//!
//! 假工具都是 `/bin/sh` 腳本，只在 unix 上使用。

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use encode_launcher::config::ProcessPriority;
use encode_launcher::job::{JobEvent, JobStatus};
use encode_launcher::supervisor::SupervisorSettings;

pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// 假的 x264：`--version` 回報 `version_line`，其餘呼叫解析 `--output`/`--pass` 後執行 `body`
pub fn fake_x264_with_version(dir: &Path, version_line: &str, body: &str) -> PathBuf {
    fake_tool(
        dir,
        "x264",
        &format!(
            r#"if [ "$1" = "--version" ]; then
  echo "{version_line}"
  exit 0
fi
out=""
pass=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift ;;
    --pass) pass="$2"; shift ;;
  esac
  shift
done
{body}"#
        ),
    )
}

pub fn fake_x264(dir: &Path, body: &str) -> PathBuf {
    fake_x264_with_version(dir, "x264 0.164.3095 baf4b8d", body)
}

/// 假的 avs2yuv：無參數時回報版本，`-frames` 時執行 `probe_body`，其餘執行 `pipe_body`
pub fn fake_avs2yuv_with_pipe(dir: &Path, probe_body: &str, pipe_body: &str) -> PathBuf {
    fake_tool(
        dir,
        "avs2yuv",
        &format!(
            r#"if [ $# -eq 0 ]; then
  echo "Avs2YUV 0.24bm2" >&2
  exit 0
fi
if [ "$2" = "-frames" ]; then
  {probe_body}
fi
{pipe_body}"#
        ),
    )
}

/// 假的 avs2yuv，管線模式輸出一個 y4m 標頭後正常結束
pub fn fake_avs2yuv(dir: &Path, probe_body: &str) -> PathBuf {
    fake_avs2yuv_with_pipe(dir, probe_body, r"printf 'YUV4MPEG2 W16 H16 F25:1 Ip A1:1\n'")
}

/// 短輪詢間隔，停滯門檻高到測試中不會觸發
pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        poll_interval: Duration::from_millis(50),
        stall_warning_polls: 200,
        stall_kill_polls: 400,
        abort_on_timeout: true,
        priority: ProcessPriority::Normal,
    }
}

pub fn statuses(events: &[JobEvent]) -> Vec<JobStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

pub fn progress(events: &[JobEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::ProgressChanged { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

pub fn logs(events: &[JobEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::MessageLogged { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
