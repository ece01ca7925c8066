use crate::classifier::ToolKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";
pub const QUEUE_FILE: &str = "queue.json";

/// 編碼程序的排程優先權
///
/// 啟動時套用到子程序：POSIX 上為整個程序群組的 nice 值，Windows 上為優先權類別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessPriority {
    High,
    AboveNormal,
    Normal,
    #[default]
    BelowNormal,
    Idle,
}

impl ProcessPriority {
    pub const ALL: [Self; 5] = [
        Self::High,
        Self::AboveNormal,
        Self::Normal,
        Self::BelowNormal,
        Self::Idle,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::AboveNormal => "Above Normal",
            Self::Normal => "Normal",
            Self::BelowNormal => "Below Normal",
            Self::Idle => "Idle",
        }
    }

    /// 對應的 nice 值；提高優先權通常需要管理者權限
    #[must_use]
    pub const fn niceness(self) -> i32 {
        match self {
            Self::High => -10,
            Self::AboveNormal => -5,
            Self::Normal => 0,
            Self::BelowNormal => 10,
            Self::Idle => 19,
        }
    }

    /// Windows `CreateProcess` 的優先權類別旗標
    #[must_use]
    pub const fn windows_priority_class(self) -> u32 {
        match self {
            Self::High => 0x0000_0080,
            Self::AboveNormal => 0x0000_8000,
            Self::Normal => 0x0000_0020,
            Self::BelowNormal => 0x0000_4000,
            Self::Idle => 0x0000_0040,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub max_concurrent_jobs: usize,
    pub auto_run_next: bool,
    pub process_priority: ProcessPriority,
    pub abort_on_timeout: bool,
    pub enable_sounds: bool,
    pub poll_interval_ms: u64,
    pub stall_warning_polls: u32,
    pub stall_kill_polls: u32,
    pub save_queue_on_exit: bool,
    /// 只在本次執行期間有效
    #[serde(skip)]
    pub shutdown_on_completion: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            auto_run_next: true,
            process_priority: ProcessPriority::default(),
            abort_on_timeout: true,
            enable_sounds: false,
            poll_interval_ms: 2500,
            stall_warning_polls: 12,
            stall_kill_polls: 120,
            save_queue_on_exit: true,
            shutdown_on_completion: false,
        }
    }
}

impl Preferences {
    /// 修正不合理的數值
    pub fn normalize(&mut self) {
        self.max_concurrent_jobs = self.max_concurrent_jobs.max(1);
        self.poll_interval_ms = self.poll_interval_ms.max(10);
        self.stall_warning_polls = self.stall_warning_polls.max(1);
        self.stall_kill_polls = self.stall_kill_polls.max(self.stall_warning_polls);
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 外部工具的位置與執行環境
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub x264: PathBuf,
    pub x265: PathBuf,
    pub avs2yuv: PathBuf,
    pub vspipe: PathBuf,
    /// 加在子程序 PATH 最前面
    pub extra_search_paths: Vec<PathBuf>,
    pub extra_env: Vec<(String, String)>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            x264: PathBuf::from("x264"),
            x265: PathBuf::from("x265"),
            avs2yuv: PathBuf::from("avs2yuv"),
            vspipe: PathBuf::from("vspipe"),
            extra_search_paths: Vec::new(),
            extra_env: Vec::new(),
        }
    }
}

impl ToolPaths {
    #[must_use]
    pub fn path_for(&self, tool: ToolKind) -> &Path {
        match tool {
            ToolKind::X264 => &self.x264,
            ToolKind::X265 => &self.x265,
            ToolKind::Avs2Yuv => &self.avs2yuv,
            ToolKind::VsPipe => &self.vspipe,
        }
    }

    pub fn set_path(&mut self, tool: ToolKind, path: PathBuf) {
        match tool {
            ToolKind::X264 => self.x264 = path,
            ToolKind::X265 => self.x265 = path,
            ToolKind::Avs2Yuv => self.avs2yuv = path,
            ToolKind::VsPipe => self.vspipe = path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preferences: Preferences,
    pub tools: ToolPaths,
    /// 設定檔所在目錄，不寫入檔案
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.base_dir.join(QUEUE_FILE)
    }
}
