use super::common::map_fatal;
use super::{ClipInfo, PassRule, ProbeRule, ToolVersion, VersionRule, capture_u32, capture_u64};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `Avs2YUV 0.24bm2`
static REGEX_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bAvs2YUV\s+(\d+)\.(\d+)(?:bm(\d+))?(M?)").expect("Invalid regex")
});

static REGEX_FATAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(script error|avisynth error|failed to load avisynth)").expect("Invalid regex")
});

/// `clip.avs: 1920x1080, 24000/1001 fps, 2345 frames`
static REGEX_CLIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)x(\d+),\s*(\d+)/(\d+)\s*fps,\s*(\d+)\s*frames").expect("Invalid regex")
});

pub static VERSION_RULES: [VersionRule; 1] = [VersionRule {
    name: "avs2yuv-version",
    regex: &REGEX_VERSION,
    map: map_version,
}];

pub static PASS_RULES: [PassRule; 1] = [PassRule {
    name: "avs2yuv-fatal",
    regex: &REGEX_FATAL,
    map: map_fatal,
}];

pub static PROBE_RULES: [ProbeRule; 1] = [ProbeRule {
    name: "avs2yuv-clip",
    regex: &REGEX_CLIP,
    map: map_clip,
}];

fn map_version(caps: &Captures<'_>) -> Option<ToolVersion> {
    let core = ToolVersion::combined_core(capture_u32(caps, 1), capture_u32(caps, 2))?;
    ToolVersion::new(
        core,
        capture_u32(caps, 3),
        caps.get(4).is_some_and(|m| !m.as_str().is_empty()),
    )
}

fn map_clip(caps: &Captures<'_>, info: &mut ClipInfo) {
    info.width = capture_u32(caps, 1);
    info.height = capture_u32(caps, 2);
    info.fps_num = capture_u32(caps, 3);
    info.fps_den = capture_u32(caps, 4);
    info.frame_count = capture_u64(caps, 5);
}

#[cfg(test)]
mod tests {
    use super::super::{classify_probe, classify_version};
    use super::*;

    #[test]
    fn test_version_line() {
        let version = classify_version(&VERSION_RULES, "Avs2YUV 0.24bm2").unwrap();
        assert_eq!(version.core, 24);
        assert_eq!(version.build, 2);
        assert_eq!(version.revision(), 240_002);
    }

    #[test]
    fn test_oversized_version_numbers_are_rejected() {
        assert!(classify_version(&VERSION_RULES, "Avs2YUV 50000000.24bm2").is_none());
        assert!(classify_version(&VERSION_RULES, "Avs2YUV 5000.24bm2").is_none());
    }

    #[test]
    fn test_probe_line_fills_clip_info() {
        let mut info = ClipInfo::default();
        assert!(classify_probe(
            &PROBE_RULES,
            "C:\\clips\\movie.avs: 1920x1080, 24000/1001 fps, 2345 frames",
            &mut info
        ));
        assert_eq!(
            info,
            ClipInfo {
                frame_count: 2345,
                width: 1920,
                height: 1080,
                fps_num: 24000,
                fps_den: 1001,
            }
        );
        assert!(info.is_complete());
    }
}
