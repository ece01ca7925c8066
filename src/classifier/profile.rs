use super::{PassRule, ProbeRule, VersionRule, avs2yuv, vspipe, x264, x265};
use crate::job::EncoderKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const REVISION_MULTIPLIER: u32 = 10_000;

/// 工具版本，打包成單一修訂號 `core * 10000 + build` 比較
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolVersion {
    pub core: u32,
    pub build: u32,
    pub modified: bool,
}

impl ToolVersion {
    /// 修訂號放不進 `u32` 時回傳 `None`，呼叫端視為無法判斷版本
    #[must_use]
    pub fn new(core: u32, build: u32, modified: bool) -> Option<Self> {
        core.checked_mul(REVISION_MULTIPLIER)?
            .checked_add(REVISION_MULTIPLIER - 1)?;
        Some(Self {
            core,
            build,
            modified,
        })
    }

    /// 主版本與次版本合併成 `major * 100 + minor`
    #[must_use]
    pub fn combined_core(major: u32, minor: u32) -> Option<u32> {
        major.checked_mul(100)?.checked_add(minor)
    }

    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.core
            .saturating_mul(REVISION_MULTIPLIER)
            .saturating_add(self.build % REVISION_MULTIPLIER)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core {} build {}", self.core, self.build)?;
        if self.modified {
            f.write_str(" (modified)")?;
        }
        Ok(())
    }
}

/// 支援的外部工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    X264,
    X265,
    Avs2Yuv,
    VsPipe,
}

/// 一個工具的全部能力資料
pub struct ToolProfile {
    pub kind: ToolKind,
    pub name: &'static str,
    pub version_args: &'static [&'static str],
    pub version_rules: &'static [VersionRule],
    pub pass_rules: &'static [PassRule],
    pub probe_rules: &'static [ProbeRule],
    pub minimum_revision: u32,
    pub last_tested_revision: u32,
}

static X264_PROFILE: ToolProfile = ToolProfile {
    kind: ToolKind::X264,
    name: "x264",
    version_args: &["--version"],
    version_rules: &x264::VERSION_RULES,
    pass_rules: &x264::PASS_RULES,
    probe_rules: &[],
    minimum_revision: 157 * REVISION_MULTIPLIER + 2935,
    last_tested_revision: 164 * REVISION_MULTIPLIER + 3108,
};

static X265_PROFILE: ToolProfile = ToolProfile {
    kind: ToolKind::X265,
    name: "x265",
    version_args: &["--version"],
    version_rules: &x265::VERSION_RULES,
    pass_rules: &x265::PASS_RULES,
    probe_rules: &[],
    minimum_revision: 300 * REVISION_MULTIPLIER,
    last_tested_revision: 306 * REVISION_MULTIPLIER + 50,
};

static AVS2YUV_PROFILE: ToolProfile = ToolProfile {
    kind: ToolKind::Avs2Yuv,
    name: "avs2yuv",
    version_args: &[],
    version_rules: &avs2yuv::VERSION_RULES,
    pass_rules: &avs2yuv::PASS_RULES,
    probe_rules: &avs2yuv::PROBE_RULES,
    minimum_revision: 24 * REVISION_MULTIPLIER + 2,
    last_tested_revision: 26 * REVISION_MULTIPLIER + 10,
};

static VSPIPE_PROFILE: ToolProfile = ToolProfile {
    kind: ToolKind::VsPipe,
    name: "vspipe",
    version_args: &["--version"],
    version_rules: &vspipe::VERSION_RULES,
    pass_rules: &vspipe::PASS_RULES,
    probe_rules: &vspipe::PROBE_RULES,
    minimum_revision: 55 * REVISION_MULTIPLIER,
    last_tested_revision: 70 * REVISION_MULTIPLIER,
};

impl ToolKind {
    #[must_use]
    pub fn profile(self) -> &'static ToolProfile {
        match self {
            Self::X264 => &X264_PROFILE,
            Self::X265 => &X265_PROFILE,
            Self::Avs2Yuv => &AVS2YUV_PROFILE,
            Self::VsPipe => &VSPIPE_PROFILE,
        }
    }

    #[must_use]
    pub const fn encoder(kind: EncoderKind) -> Self {
        match kind {
            EncoderKind::X264 => Self::X264,
            EncoderKind::X265 => Self::X265,
        }
    }

    #[must_use]
    pub const fn is_encoder(self) -> bool {
        matches!(self, Self::X264 | Self::X265)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().name)
    }
}

/// 來源檔案的處理方式，依副檔名決定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 直接交給編碼器讀取
    Direct,
    /// 由解碼工具產生畫面再以管線送入編碼器
    Script(ToolKind),
}

impl SourceKind {
    #[must_use]
    pub fn detect(source: &Path) -> Self {
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("avs") => Self::Script(ToolKind::Avs2Yuv),
            Some("vpy" | "py") => Self::Script(ToolKind::VsPipe),
            _ => Self::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_detection() {
        assert_eq!(
            SourceKind::detect(Path::new("/clips/movie.AVS")),
            SourceKind::Script(ToolKind::Avs2Yuv)
        );
        assert_eq!(
            SourceKind::detect(Path::new("/clips/movie.vpy")),
            SourceKind::Script(ToolKind::VsPipe)
        );
        assert_eq!(
            SourceKind::detect(Path::new("/clips/movie.mkv")),
            SourceKind::Direct
        );
    }

    #[test]
    fn test_profiles_are_consistent() {
        for kind in [
            ToolKind::X264,
            ToolKind::X265,
            ToolKind::Avs2Yuv,
            ToolKind::VsPipe,
        ] {
            let profile = kind.profile();
            assert_eq!(profile.kind, kind);
            assert!(profile.minimum_revision <= profile.last_tested_revision);
            assert!(!profile.version_rules.is_empty());
            assert_eq!(kind.is_encoder(), profile.probe_rules.is_empty());
        }
    }
}
