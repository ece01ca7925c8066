//! 逐行分類工具輸出
//!
//! 每個工具提供三組依序比對的規則：版本探測、編碼監控、來源探測。
//! 規則依宣告順序嘗試，第一個符合的規則決定結果；都不符合的行原樣寫入日誌。
//! 新增工具只需要新增一組規則資料，不需要新的控制流程。

mod avs2yuv;
mod common;
mod profile;
mod vspipe;
mod x264;
mod x265;

use crate::job::JobStatus;
use regex::{Captures, Regex};
use std::sync::LazyLock;

pub use profile::{SourceKind, ToolKind, ToolProfile, ToolVersion};

/// 分類時需要的外部資訊
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyContext {
    /// 目前的編碼階段，進度行會回報這個狀態
    pub phase: JobStatus,
    /// 已知的總幀數（來自來源探測）
    pub total_frames: Option<u64>,
}

impl ClassifyContext {
    #[must_use]
    pub const fn new(phase: JobStatus, total_frames: Option<u64>) -> Self {
        Self {
            phase,
            total_frames,
        }
    }
}

/// 一行輸出對工作狀態造成的變化
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineDelta {
    pub status: Option<JobStatus>,
    /// 0.0 ~ 1.0
    pub progress: Option<f64>,
    pub details: Option<String>,
    /// 需要寫入工作日誌的文字
    pub log: Option<String>,
    /// 工具回報了致命錯誤
    pub fatal: bool,
}

impl LineDelta {
    #[must_use]
    pub fn log_only(line: &str) -> Self {
        Self {
            log: Some(line.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fatal(line: &str) -> Self {
        Self {
            log: Some(line.to_string()),
            fatal: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn percent(&self) -> Option<u32> {
        self.progress
            .map(|p| (p.clamp(0.0, 1.0) * 100.0).floor() as u32)
    }
}

/// 編碼監控規則
pub struct PassRule {
    pub name: &'static str,
    pub regex: &'static LazyLock<Regex>,
    pub map: fn(&Captures<'_>, &str, &ClassifyContext) -> LineDelta,
}

/// 版本探測規則
pub struct VersionRule {
    pub name: &'static str,
    pub regex: &'static LazyLock<Regex>,
    pub map: fn(&Captures<'_>) -> Option<ToolVersion>,
}

/// 來源探測規則，每條規則填入 [`ClipInfo`] 的部分欄位
pub struct ProbeRule {
    pub name: &'static str,
    pub regex: &'static LazyLock<Regex>,
    pub map: fn(&Captures<'_>, &mut ClipInfo),
}

/// 來源影片資訊
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipInfo {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
}

impl ClipInfo {
    /// 幀數與解析度都已知
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.frame_count > 0 && self.width > 0 && self.height > 0
    }
}

/// 以規則表分類一行編碼輸出
#[must_use]
pub fn classify_line(rules: &[PassRule], line: &str, ctx: &ClassifyContext) -> LineDelta {
    rules
        .iter()
        .find_map(|rule| {
            rule.regex.captures(line).map(|caps| {
                log::trace!("規則 {} 符合: {line}", rule.name);
                (rule.map)(&caps, line, ctx)
            })
        })
        .unwrap_or_else(|| LineDelta::log_only(line))
}

/// 以規則表嘗試從一行輸出取得版本
#[must_use]
pub fn classify_version(rules: &[VersionRule], line: &str) -> Option<ToolVersion> {
    rules.iter().find_map(|rule| {
        let caps = rule.regex.captures(line)?;
        log::trace!("版本規則 {} 符合: {line}", rule.name);
        (rule.map)(&caps)
    })
}

/// 以規則表更新來源資訊，回傳是否有規則符合
pub fn classify_probe(rules: &[ProbeRule], line: &str, info: &mut ClipInfo) -> bool {
    rules
        .iter()
        .find_map(|rule| rule.regex.captures(line).map(|caps| (rule.map)(&caps, info)))
        .is_some()
}

/// 解析數字擷取群組，失敗時回傳 0
fn capture_u64(caps: &Captures<'_>, index: usize) -> u64 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn capture_u32(caps: &Captures<'_>, index: usize) -> u32 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
