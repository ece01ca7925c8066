use crate::classifier::SourceKind;
use crate::job::EncoderKind;
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 可以直接交給編碼器或解碼工具的來源副檔名
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "avs", "vpy", "py", "y4m", "yuv", "mkv", "mp4", "m2ts", "ts", "avi", "264", "h264",
];

#[derive(Debug, Clone)]
pub struct SourceFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub kind: SourceKind,
}

#[must_use]
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// 掃描資料夾下所有來源檔，腳本優先，其餘依路徑排序
pub fn scan_source_files(directory: &Path) -> Result<Vec<SourceFileInfo>> {
    let mut sources: Vec<SourceFileInfo> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_source_file(entry.path()))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let kind = SourceKind::detect(entry.path());
            Some(SourceFileInfo {
                path: entry.into_path(),
                size: metadata.len(),
                kind,
            })
        })
        .collect();

    sources.sort_by(|a, b| {
        let a_script = matches!(a.kind, SourceKind::Script(_));
        let b_script = matches!(b.kind, SourceKind::Script(_));
        b_script.cmp(&a_script).then_with(|| a.path.cmp(&b.path))
    });
    Ok(sources)
}

/// 預設輸出路徑：與來源同資料夾，依編碼器使用原始串流副檔名
#[must_use]
pub fn default_output_path(source: &Path, encoder: EncoderKind) -> PathBuf {
    let extension = match encoder {
        EncoderKind::X264 => "264",
        EncoderKind::X265 => "hevc",
    };
    let output = source.with_extension(extension);
    if output == source {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        source.with_file_name(format!("{stem}_encoded.{extension}"))
    } else {
        output
    }
}
