use super::common::{
    REGEX_ENCODED, REGEX_FRAMES, REGEX_PERCENT, map_encoded, map_fatal, map_frames, map_percent,
};
use super::{PassRule, ToolVersion, VersionRule, capture_u32};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `x265 [info]: HEVC encoder version 3.5+1-f0c1022b6`
static REGEX_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"HEVC encoder version\s+(\d+)\.(\d+)(?:\+(\d+))?(?:-[0-9a-f]+)?(M?)")
        .expect("Invalid regex")
});

static REGEX_FATAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bx265 \[error\]:").expect("Invalid regex"));

pub static VERSION_RULES: [VersionRule; 1] = [VersionRule {
    name: "x265-version",
    regex: &REGEX_VERSION,
    map: map_version,
}];

pub static PASS_RULES: [PassRule; 4] = [
    PassRule {
        name: "x265-percent",
        regex: &REGEX_PERCENT,
        map: map_percent,
    },
    PassRule {
        name: "x265-frames",
        regex: &REGEX_FRAMES,
        map: map_frames,
    },
    PassRule {
        name: "x265-fatal",
        regex: &REGEX_FATAL,
        map: map_fatal,
    },
    PassRule {
        name: "x265-encoded",
        regex: &REGEX_ENCODED,
        map: map_encoded,
    },
];

/// 主版本與次版本合併為 core（3.5 → 305），`+N` 為 build
fn map_version(caps: &Captures<'_>) -> Option<ToolVersion> {
    let core = ToolVersion::combined_core(capture_u32(caps, 1), capture_u32(caps, 2))?;
    ToolVersion::new(
        core,
        capture_u32(caps, 3),
        caps.get(4).is_some_and(|m| !m.as_str().is_empty()),
    )
}

#[cfg(test)]
mod tests {
    use super::super::{ClassifyContext, classify_line, classify_version};
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn test_version_line() {
        let version = classify_version(
            &VERSION_RULES,
            "x265 [info]: HEVC encoder version 3.5+1-f0c1022b6",
        )
        .unwrap();
        assert_eq!(version.core, 305);
        assert_eq!(version.build, 1);

        let release = classify_version(&VERSION_RULES, "x265 [info]: HEVC encoder version 3.6")
            .unwrap();
        assert_eq!(release.revision(), 3_060_000);
    }

    #[test]
    fn test_progress_line() {
        let ctx = ClassifyContext::new(JobStatus::RunningPass2, Some(2915));
        let delta = classify_line(
            &PASS_RULES,
            "[99.9%] 2912/2915 frames, 12.34 fps, 3000.12 kb/s, eta 0:00:00",
            &ctx,
        );
        assert_eq!(delta.status, Some(JobStatus::RunningPass2));
        assert_eq!(delta.percent(), Some(99));
        assert_eq!(
            delta.details.as_deref(),
            Some("2912/2915 frames, 12.34 fps, 3000.12 kb/s, eta 0:00:00")
        );
    }
}
