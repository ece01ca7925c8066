//! 依編碼選項組出各工具的命令列參數

use crate::classifier::{ClipInfo, ToolKind};
use crate::job::{
    EncoderKind, EncoderVariant, EncodingOptions, JobStatus, RateControl, split_custom_args,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// 單次或兩次編碼中的第幾次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Single,
    First,
    Second,
}

impl Pass {
    /// 依位元率控制模式排出要執行的編碼次序
    #[must_use]
    pub fn plan(rate_control: RateControl) -> &'static [Self] {
        if rate_control.is_multi_pass() {
            &[Self::First, Self::Second]
        } else {
            &[Self::Single]
        }
    }

    #[must_use]
    pub const fn status(self) -> JobStatus {
        match self {
            Self::Single => JobStatus::Running,
            Self::First => JobStatus::RunningPass1,
            Self::Second => JobStatus::RunningPass2,
        }
    }

    #[must_use]
    pub const fn number(self) -> Option<u8> {
        match self {
            Self::Single => None,
            Self::First => Some(1),
            Self::Second => Some(2),
        }
    }

    /// 是否產生最終輸出檔（第一次編碼只產生統計檔）
    #[must_use]
    pub const fn writes_output(self) -> bool {
        !matches!(self, Self::First)
    }
}

/// 編碼器的輸入來源
#[derive(Debug, Clone, Copy)]
pub enum EncoderInput<'a> {
    File(&'a Path),
    /// 由上游解碼程序經 stdin 送入 y4m
    Pipe(&'a ClipInfo),
}

#[must_use]
pub const fn null_device() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// 兩次編碼的統計檔路徑
#[must_use]
pub fn stats_file_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".stats");
    PathBuf::from(name)
}

/// 組出單次編碼的編碼器參數
#[must_use]
pub fn encoder_pass_args(
    options: &EncodingOptions,
    pass: Pass,
    stats_file: &Path,
    output: &Path,
    input: EncoderInput<'_>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));

    match options.rate_control {
        RateControl::Crf => push(&["--crf", format!("{:.1}", options.quantizer).as_str()]),
        RateControl::Cqp => push(&["--qp", format!("{:.0}", options.quantizer).as_str()]),
        RateControl::Abr | RateControl::TwoPass => {
            push(&["--bitrate", options.bitrate.to_string().as_str()]);
        }
    }

    if let Some(number) = pass.number() {
        push(&["--pass", number.to_string().as_str()]);
        args.push("--stats".into());
        args.push(stats_file.as_os_str().to_os_string());
    }

    for (flag, value) in [
        ("--preset", &options.preset),
        ("--tune", &options.tune),
        ("--profile", &options.profile),
    ] {
        let value = value.trim();
        if !value.is_empty() && !value.eq_ignore_ascii_case("none") {
            args.push(flag.into());
            args.push(value.into());
        }
    }

    if options.variant == EncoderVariant::Bit10 {
        args.push("--output-depth".into());
        args.push("10".into());
    }

    args.extend(
        split_custom_args(&options.custom_encoder_args)
            .into_iter()
            .map(OsString::from),
    );

    args.push("--output".into());
    if pass.writes_output() {
        args.push(output.as_os_str().to_os_string());
    } else {
        args.push(null_device().into());
    }

    match (options.encoder, input) {
        (EncoderKind::X264, EncoderInput::File(path)) => {
            args.push(path.as_os_str().to_os_string());
        }
        (EncoderKind::X264, EncoderInput::Pipe(clip)) => {
            let frames = clip.frame_count.to_string();
            for item in ["--demuxer", "y4m", "--frames", frames.as_str(), "-"] {
                args.push(item.into());
            }
        }
        (EncoderKind::X265, EncoderInput::File(path)) => {
            args.push("--input".into());
            args.push(path.as_os_str().to_os_string());
        }
        (EncoderKind::X265, EncoderInput::Pipe(clip)) => {
            let frames = clip.frame_count.to_string();
            for item in ["--y4m", "--frames", frames.as_str(), "--input", "-"] {
                args.push(item.into());
            }
        }
    }

    args
}

/// 解碼工具輸出 y4m 到 stdout 的參數
#[must_use]
pub fn source_pipe_args(tool: ToolKind, script: &Path, custom: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = split_custom_args(custom)
        .into_iter()
        .map(OsString::from)
        .collect();

    match tool {
        ToolKind::VsPipe => {
            args.extend(["-c", "y4m"].map(OsString::from));
            args.push(script.as_os_str().to_os_string());
            args.push("-".into());
        }
        _ => {
            args.push(script.as_os_str().to_os_string());
            args.extend(["-o", "-"].map(OsString::from));
        }
    }

    args
}

/// 來源探測參數：avs2yuv 只解一幀，vspipe 只輸出資訊
#[must_use]
pub fn source_probe_args(tool: ToolKind, script: &Path) -> Vec<OsString> {
    let script = script.as_os_str().to_os_string();
    match tool {
        ToolKind::VsPipe => vec!["--info".into(), script, "-".into()],
        _ => vec![
            script,
            "-frames".into(),
            "1".into(),
            "-o".into(),
            null_device().into(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn test_two_pass_plan_is_sequential() {
        assert_eq!(Pass::plan(RateControl::TwoPass), &[Pass::First, Pass::Second]);
        assert_eq!(Pass::plan(RateControl::Crf), &[Pass::Single]);
    }

    #[test]
    fn test_crf_direct_x264_args() {
        let options = EncodingOptions {
            custom_encoder_args: "--aq-mode 3".to_string(),
            ..EncodingOptions::default()
        };
        let args = encoder_pass_args(
            &options,
            Pass::Single,
            Path::new("/out/a.mkv.stats"),
            Path::new("/out/a.mkv"),
            EncoderInput::File(Path::new("/in/a.mkv")),
        );
        assert_eq!(
            as_strings(&args),
            vec![
                "--crf", "22.0", "--preset", "medium", "--aq-mode", "3", "--output",
                "/out/a.mkv", "/in/a.mkv"
            ]
        );
    }

    #[test]
    fn test_first_pass_writes_stats_only() {
        let options = EncodingOptions {
            encoder: EncoderKind::X265,
            variant: EncoderVariant::Bit10,
            rate_control: RateControl::TwoPass,
            bitrate: 2500,
            preset: String::new(),
            ..EncodingOptions::default()
        };
        let clip = ClipInfo {
            frame_count: 240,
            width: 1280,
            height: 720,
            fps_num: 24,
            fps_den: 1,
        };
        let args = as_strings(&encoder_pass_args(
            &options,
            Pass::First,
            Path::new("/out/a.hevc.stats"),
            Path::new("/out/a.hevc"),
            EncoderInput::Pipe(&clip),
        ));

        assert_eq!(
            args,
            vec![
                "--bitrate",
                "2500",
                "--pass",
                "1",
                "--stats",
                "/out/a.hevc.stats",
                "--output-depth",
                "10",
                "--output",
                null_device(),
                "--y4m",
                "--frames",
                "240",
                "--input",
                "-",
            ]
        );
    }

    #[test]
    fn test_stats_file_name() {
        assert_eq!(
            stats_file_for(Path::new("/out/movie.mkv")),
            PathBuf::from("/out/movie.mkv.stats")
        );
    }

    #[test]
    fn test_source_args() {
        let args = as_strings(&source_pipe_args(
            ToolKind::Avs2Yuv,
            Path::new("/in/a.avs"),
            "-seek 10",
        ));
        assert_eq!(args, vec!["-seek", "10", "/in/a.avs", "-o", "-"]);

        let probe = as_strings(&source_probe_args(ToolKind::VsPipe, Path::new("/in/a.vpy")));
        assert_eq!(probe, vec!["--info", "/in/a.vpy", "-"]);
    }
}
