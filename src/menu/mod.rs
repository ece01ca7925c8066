mod handlers;
mod main_menu;
mod settings_menu;

pub use main_menu::{App, show_main_menu};
