use super::common::map_fatal;
use super::{ClipInfo, PassRule, ProbeRule, ToolVersion, VersionRule, capture_u32, capture_u64};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `Core R57`
static REGEX_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCore\s+R(\d+)(M?)").expect("Invalid regex"));

static REGEX_FATAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(script evaluation failed|failed to evaluate|python exception)")
        .expect("Invalid regex")
});

static REGEX_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Width:\s*(\d+)").expect("Invalid regex"));
static REGEX_HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Height:\s*(\d+)").expect("Invalid regex"));
static REGEX_FRAMES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Frames:\s*(\d+)").expect("Invalid regex"));
static REGEX_FPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FPS:\s*(\d+)/(\d+)").expect("Invalid regex"));

pub static VERSION_RULES: [VersionRule; 1] = [VersionRule {
    name: "vspipe-version",
    regex: &REGEX_VERSION,
    map: map_version,
}];

pub static PASS_RULES: [PassRule; 1] = [PassRule {
    name: "vspipe-fatal",
    regex: &REGEX_FATAL,
    map: map_fatal,
}];

pub static PROBE_RULES: [ProbeRule; 4] = [
    ProbeRule {
        name: "vspipe-width",
        regex: &REGEX_WIDTH,
        map: |caps, info| info.width = capture_u32(caps, 1),
    },
    ProbeRule {
        name: "vspipe-height",
        regex: &REGEX_HEIGHT,
        map: |caps, info| info.height = capture_u32(caps, 1),
    },
    ProbeRule {
        name: "vspipe-frames",
        regex: &REGEX_FRAMES,
        map: |caps, info| info.frame_count = capture_u64(caps, 1),
    },
    ProbeRule {
        name: "vspipe-fps",
        regex: &REGEX_FPS,
        map: map_fps,
    },
];

fn map_version(caps: &Captures<'_>) -> Option<ToolVersion> {
    ToolVersion::new(
        capture_u32(caps, 1),
        0,
        caps.get(2).is_some_and(|m| !m.as_str().is_empty()),
    )
}

fn map_fps(caps: &Captures<'_>, info: &mut ClipInfo) {
    info.fps_num = capture_u32(caps, 1);
    info.fps_den = capture_u32(caps, 2);
}
