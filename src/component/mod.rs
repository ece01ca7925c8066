//! 終端機介面元件

pub mod queue_console;

pub use queue_console::{MonitorOutcome, QueueConsole, print_queue};
