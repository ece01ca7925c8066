use anyhow::Result;
use console::{Term, style};
use encode_launcher::config::Config;
use encode_launcher::init;
use encode_launcher::menu::{App, show_main_menu};
use encode_launcher::signal::setup_interrupt_signal;
use log::{info, warn};

fn main() -> Result<()> {
    init::init();
    let term = Term::stdout();
    let signal = setup_interrupt_signal()?;

    let config = Config::new()?;
    let mut app = App::new(config, signal);

    loop {
        match show_main_menu(&term, &mut app) {
            Ok(true) => {}
            Ok(false) => {
                term.clear_screen()?;
                println!("\n{}", style("再見！").green().bold());
                info!("程式正常結束");
                break;
            }
            Err(e) => {
                warn!("程式錯誤: {e}");
                eprintln!("{} {}", style("錯誤:").red().bold(), e);
                break;
            }
        }
    }

    app.shutdown()
}
