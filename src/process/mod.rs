//! 子程序控制：啟動、輸出切行、暫停/恢復/終止整棵程序樹、結束碼判讀

mod exit;
pub mod group;
mod handle;
mod line_stream;
mod tree;

pub use exit::{ExitKind, NORMAL_EXIT_CODES, SIGNALLED_EXIT_CODE, exit_code};
pub use handle::{
    ChannelMode, LaunchSpec, OutputLine, OutputState, ProcessHandle, StdinSource, StdoutTarget,
    StreamTag,
};
pub use line_stream::LineStream;
