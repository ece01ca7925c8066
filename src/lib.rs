pub mod classifier;
pub mod component;
pub mod config;
pub mod error;
pub mod init;
pub mod job;
pub mod menu;
pub mod process;
pub mod scheduler;
pub mod signal;
pub mod supervisor;
pub mod tools;

use anyhow::Result;
use console::{Term, style};

pub fn pause(term: &Term) -> Result<()> {
    println!("\n{}", style("按 Enter 繼續...").dim());
    term.read_line()?;
    Ok(())
}
