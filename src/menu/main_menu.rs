use crate::component::queue_console::{QueueConsole, print_queue};
use crate::config::Config;
use crate::menu::handlers::{
    add_directory, add_source_file, install_shutdown_handler, load_queue, manage_job, monitor_queue,
    save_queue, start_queue,
};
use crate::menu::settings_menu::show_settings_menu;
use crate::pause;
use crate::scheduler::Scheduler;
use crate::signal::InterruptSignal;
use anyhow::Result;
use console::{Term, style};
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use log::{info, warn};

/// 前端狀態：設定、排程器與進度顯示
pub struct App {
    pub config: Config,
    pub scheduler: Scheduler,
    pub console: QueueConsole,
}

impl App {
    pub fn new(config: Config, signal: InterruptSignal) -> Self {
        let mut scheduler = Scheduler::new(config.preferences.clone(), config.tools.clone());
        install_shutdown_handler(&mut scheduler);

        let queue_path = config.queue_path();
        if let Err(e) = scheduler.load_queue(&queue_path) {
            warn!("無法還原佇列: {e:#}");
        }

        let console = QueueConsole::new(&mut scheduler, signal);
        Self {
            config,
            scheduler,
            console,
        }
    }

    /// 結束前保存佇列並中止所有工作
    pub fn shutdown(&mut self) -> Result<()> {
        if self.config.preferences.save_queue_on_exit {
            self.scheduler.save_queue(&self.config.queue_path())?;
        }
        if self.scheduler.has_active_jobs() {
            info!("結束程式，中止執行中的工作");
        }
        self.scheduler.abort_all();
        Ok(())
    }
}

pub fn show_main_menu(term: &Term, app: &mut App) -> Result<bool> {
    app.console.catch_up(&mut app.scheduler);
    term.clear_screen()?;

    println!("{}", style("=== 編碼工作排程 ===").cyan().bold());
    println!(
        "{}",
        style(format!(
            "佇列 {} 個工作，執行中 {} 個（ESC 離開）",
            app.scheduler.len(),
            app.scheduler.active_count()
        ))
        .dim()
    );

    let options = [
        "新增來源檔案",
        "新增資料夾內的來源",
        "檢視佇列",
        "開始執行佇列",
        "監看執行進度",
        "管理工作",
        "保存佇列",
        "載入佇列",
        "設定",
        "離開",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("請選擇功能")
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => add_source_file(term, app)?,
        Some(1) => add_directory(term, app)?,
        Some(2) => {
            print_queue(&app.scheduler);
            pause(term)?;
        }
        Some(3) => start_queue(term, app)?,
        Some(4) => monitor_queue(term, app)?,
        Some(5) => manage_job(term, app)?,
        Some(6) => save_queue(term, app)?,
        Some(7) => load_queue(term, app)?,
        Some(8) => show_settings_menu(term, app)?,
        Some(9) | None => return Ok(false),
        _ => unreachable!(),
    }

    Ok(true)
}
