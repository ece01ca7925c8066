//! 編碼工作：狀態機、編碼選項快照、日誌與控制通道

mod control;
mod events;
mod options;
mod record;
mod status;

pub use control::{CancelToken, GateRelease, JobControl, PauseGate};
pub use events::{EventSink, JobEvent, JobId};
pub use options::{
    EncoderArch, EncoderKind, EncoderVariant, EncodingOptions, RateControl, split_custom_args,
};
pub use record::{Job, LogLine};
pub use status::{JobStatus, is_valid_path};
