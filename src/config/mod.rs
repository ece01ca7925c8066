pub mod load;
pub mod save;
pub mod types;

pub use save::save_settings;
pub use types::{Config, Preferences, ProcessPriority, QUEUE_FILE, SETTINGS_FILE, ToolPaths};
