use super::common::{
    REGEX_ENCODED, REGEX_FRAMES, REGEX_PERCENT, map_encoded, map_fatal, map_frames, map_percent,
};
use super::{ClassifyContext, LineDelta, PassRule, ToolVersion, VersionRule, capture_u32};
use crate::job::JobStatus;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `x264 0.164.3095 baf4b8d`，建置號後緊接 `M` 表示修改過的版本
static REGEX_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bx264\s+\d+\.(\d+)\.(\d+)(M?)\b").expect("Invalid regex")
});

/// `indexing input file [12.3%]`
static REGEX_INDEXING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)indexing.+?\[\s*(\d+)(?:\.\d+)?%\]").expect("Invalid regex")
});

static REGEX_FATAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bx264 \[error\]:").expect("Invalid regex"));

pub static VERSION_RULES: [VersionRule; 1] = [VersionRule {
    name: "x264-version",
    regex: &REGEX_VERSION,
    map: map_version,
}];

pub static PASS_RULES: [PassRule; 5] = [
    PassRule {
        name: "x264-percent",
        regex: &REGEX_PERCENT,
        map: map_percent,
    },
    PassRule {
        name: "x264-frames",
        regex: &REGEX_FRAMES,
        map: map_frames,
    },
    PassRule {
        name: "x264-indexing",
        regex: &REGEX_INDEXING,
        map: map_indexing,
    },
    PassRule {
        name: "x264-fatal",
        regex: &REGEX_FATAL,
        map: map_fatal,
    },
    PassRule {
        name: "x264-encoded",
        regex: &REGEX_ENCODED,
        map: map_encoded,
    },
];

fn map_version(caps: &Captures<'_>) -> Option<ToolVersion> {
    ToolVersion::new(
        capture_u32(caps, 1),
        capture_u32(caps, 2),
        caps.get(3).is_some_and(|m| !m.as_str().is_empty()),
    )
}

fn map_indexing(caps: &Captures<'_>, line: &str, _ctx: &ClassifyContext) -> LineDelta {
    LineDelta {
        status: Some(JobStatus::Indexing),
        progress: Some(f64::from(capture_u32(caps, 1)) / 100.0),
        details: Some(line.to_string()),
        ..LineDelta::default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{classify_line, classify_version};
    use super::*;

    #[test]
    fn test_version_line() {
        let version = classify_version(&VERSION_RULES, "x264 0.164.3095 baf4b8d").unwrap();
        assert_eq!(version.core, 164);
        assert_eq!(version.build, 3095);
        assert!(!version.modified);
        assert_eq!(version.revision(), 1_643_095);

        let modified = classify_version(&VERSION_RULES, "x264 0.164.3108M 31e19f9").unwrap();
        assert!(modified.modified);
        assert!(classify_version(&VERSION_RULES, "(libswscale 6.7.100)").is_none());
    }

    #[test]
    fn test_version_too_large_for_revision_is_rejected() {
        assert!(classify_version(&VERSION_RULES, "x264 0.500000.3095 baf4b8d").is_none());
        assert!(classify_version(&VERSION_RULES, "x264 0.429496.3095 baf4b8d").is_none());
        assert!(classify_version(&VERSION_RULES, "x264 0.429495.3095 baf4b8d").is_some());
    }

    #[test]
    fn test_indexing_line_reports_indexing_phase() {
        let ctx = ClassifyContext::new(JobStatus::Running, None);
        let delta = classify_line(&PASS_RULES, "ffms [info]: indexing input file [37.5%]", &ctx);
        assert_eq!(delta.status, Some(JobStatus::Indexing));
        assert_eq!(delta.percent(), Some(37));
    }

    #[test]
    fn test_frame_counter_uses_known_total() {
        let ctx = ClassifyContext::new(JobStatus::RunningPass1, Some(400));
        let delta = classify_line(&PASS_RULES, "100 frames: 25.00 fps, 800.00 kb/s", &ctx);
        assert_eq!(delta.status, Some(JobStatus::RunningPass1));
        assert_eq!(delta.percent(), Some(25));

        let unknown = ClassifyContext::new(JobStatus::Running, None);
        let delta = classify_line(&PASS_RULES, "100 frames: 25.00 fps, 800.00 kb/s", &unknown);
        assert_eq!(delta.progress, None);
        assert!(delta.details.is_some());
    }

    #[test]
    fn test_error_line_is_fatal() {
        let ctx = ClassifyContext::new(JobStatus::Running, None);
        let delta = classify_line(&PASS_RULES, "x264 [error]: could not open input file", &ctx);
        assert!(delta.fatal);
        assert!(delta.log.is_some());
    }
}
