//! x264 / x265 共用的進度格式

use super::{ClassifyContext, LineDelta, capture_u64};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `[ 42.3%] 1234/2915 frames, 48.23 fps, 1520.33 kb/s, eta 0:00:35`
pub static REGEX_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\s*(\d+)(?:\.(\d+))?%\]\s*(.+)$").expect("Invalid regex")
});

/// `1234 frames: 48.23 fps, 1520.33 kb/s`（總幀數未知時的輸出）
pub static REGEX_FRAMES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+frames:\s*(.+)$").expect("Invalid regex"));

/// `encoded 2915 frames, 48.12 fps, 1519.80 kb/s`
pub static REGEX_ENCODED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^encoded\s+(\d+)\s+frames").expect("Invalid regex"));

pub fn map_percent(caps: &Captures<'_>, _line: &str, ctx: &ClassifyContext) -> LineDelta {
    let whole = capture_u64(caps, 1) as f64;
    let fraction = caps
        .get(2)
        .and_then(|m| format!("0.{}", m.as_str()).parse::<f64>().ok())
        .unwrap_or(0.0);

    LineDelta {
        status: Some(ctx.phase),
        progress: Some((whole + fraction) / 100.0),
        details: caps.get(3).map(|m| m.as_str().trim().to_string()),
        ..LineDelta::default()
    }
}

pub fn map_frames(caps: &Captures<'_>, line: &str, ctx: &ClassifyContext) -> LineDelta {
    let done = capture_u64(caps, 1);
    let progress = ctx
        .total_frames
        .filter(|total| *total > 0)
        .map(|total| done as f64 / total as f64);

    LineDelta {
        status: Some(ctx.phase),
        progress,
        details: Some(line.to_string()),
        ..LineDelta::default()
    }
}

pub fn map_encoded(_caps: &Captures<'_>, line: &str, _ctx: &ClassifyContext) -> LineDelta {
    LineDelta {
        details: Some(line.to_string()),
        log: Some(line.to_string()),
        ..LineDelta::default()
    }
}

pub fn map_fatal(_caps: &Captures<'_>, line: &str, _ctx: &ClassifyContext) -> LineDelta {
    LineDelta::fatal(line)
}
