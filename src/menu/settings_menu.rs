use crate::classifier::ToolKind;
use crate::config::{ProcessPriority, save_settings};
use crate::menu::App;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use log::info;
use std::path::PathBuf;

const TOOLS: [ToolKind; 4] = [
    ToolKind::X264,
    ToolKind::X265,
    ToolKind::Avs2Yuv,
    ToolKind::VsPipe,
];

fn on_off(value: bool) -> &'static str {
    if value { "開" } else { "關" }
}

pub fn show_settings_menu(term: &Term, app: &mut App) -> Result<()> {
    loop {
        term.clear_screen()?;
        println!("{}", style("=== 設定 ===").cyan().bold());

        let prefs = &app.config.preferences;
        let options = [
            format!("同時執行的工作數: {}", prefs.max_concurrent_jobs),
            format!("完成後自動執行下一個: {}", on_off(prefs.auto_run_next)),
            format!("程序優先權: {}", prefs.process_priority.label()),
            format!("無回應時中止工作: {}", on_off(prefs.abort_on_timeout)),
            format!("完成提示音: {}", on_off(prefs.enable_sounds)),
            format!(
                "輸出輪詢 {} ms，{} 次無輸出警告，{} 次無輸出中止",
                prefs.poll_interval_ms, prefs.stall_warning_polls, prefs.stall_kill_polls
            ),
            format!("離開時保存佇列: {}", on_off(prefs.save_queue_on_exit)),
            format!(
                "全部完成後關機（僅本次）: {}",
                on_off(prefs.shutdown_on_completion)
            ),
            "外部工具路徑".to_string(),
            "返回".to_string(),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("選擇要修改的項目")
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        let prefs = &mut app.config.preferences;
        match selection {
            Some(0) => {
                prefs.max_concurrent_jobs = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("同時執行的工作數")
                    .default(prefs.max_concurrent_jobs)
                    .interact_text()?;
            }
            Some(1) => prefs.auto_run_next = !prefs.auto_run_next,
            Some(2) => {
                let labels = ProcessPriority::ALL.map(ProcessPriority::label);
                let current = ProcessPriority::ALL
                    .iter()
                    .position(|p| *p == prefs.process_priority)
                    .unwrap_or(0);
                if let Some(index) = Select::with_theme(&ColorfulTheme::default())
                    .with_prompt("程序優先權")
                    .items(&labels)
                    .default(current)
                    .interact_on_opt(term)?
                {
                    prefs.process_priority = ProcessPriority::ALL[index];
                }
            }
            Some(3) => prefs.abort_on_timeout = !prefs.abort_on_timeout,
            Some(4) => prefs.enable_sounds = !prefs.enable_sounds,
            Some(5) => edit_polling(prefs)?,
            Some(6) => prefs.save_queue_on_exit = !prefs.save_queue_on_exit,
            Some(7) => {
                prefs.shutdown_on_completion = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("所有工作完成後關閉電腦？")
                    .default(!prefs.shutdown_on_completion)
                    .interact()?;
            }
            Some(8) => edit_tool_paths(term, app)?,
            Some(9) | None => return Ok(()),
            _ => unreachable!(),
        }

        apply_and_save(term, app)?;
    }
}

fn edit_polling(prefs: &mut crate::config::Preferences) -> Result<()> {
    let theme = ColorfulTheme::default();
    prefs.poll_interval_ms = Input::with_theme(&theme)
        .with_prompt("輪詢間隔 (ms)")
        .default(prefs.poll_interval_ms)
        .interact_text()?;
    prefs.stall_warning_polls = Input::with_theme(&theme)
        .with_prompt("幾次無輸出後警告")
        .default(prefs.stall_warning_polls)
        .interact_text()?;
    prefs.stall_kill_polls = Input::with_theme(&theme)
        .with_prompt("幾次無輸出後中止")
        .default(prefs.stall_kill_polls)
        .interact_text()?;
    Ok(())
}

fn edit_tool_paths(term: &Term, app: &mut App) -> Result<()> {
    let items: Vec<String> = TOOLS
        .iter()
        .map(|tool| format!("{tool}: {}", app.config.tools.path_for(*tool).display()))
        .collect();

    let Some(index) = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("選擇工具")
        .items(&items)
        .default(0)
        .interact_on_opt(term)?
    else {
        return Ok(());
    };

    let tool = TOOLS[index];
    let path: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{tool} 路徑"))
        .default(app.config.tools.path_for(tool).display().to_string())
        .interact_text()?;
    app.config
        .tools
        .set_path(tool, PathBuf::from(path.trim().trim_matches('"')));
    Ok(())
}

/// 修正數值、同步到排程器並寫回設定檔
fn apply_and_save(term: &Term, app: &mut App) -> Result<()> {
    app.config.preferences.normalize();
    app.scheduler.set_preferences(app.config.preferences.clone());
    app.scheduler.set_tools(app.config.tools.clone());

    if let Err(e) = save_settings(&app.config) {
        eprintln!("{} {e:#}", style("錯誤:").red().bold());
        return pause(term);
    }
    info!("設定已保存到 {}", app.config.settings_path().display());
    Ok(())
}
