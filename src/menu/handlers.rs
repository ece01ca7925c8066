use crate::component::queue_console::{MonitorOutcome, print_queue};
use crate::job::{EncoderKind, EncoderVariant, EncodingOptions, JobId, RateControl};
use crate::menu::App;
use crate::pause;
use crate::scheduler::{MoveDirection, Scheduler};
use crate::tools::{
    default_output_path, ensure_parent_exists, scan_source_files, validate_directory_exists,
    validate_file_exists,
};
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use log::{error, info};
use std::path::PathBuf;
use std::process::Command;

fn prompt_path(prompt: &str) -> Result<PathBuf> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(path.trim().trim_matches('"')))
}

/// 詢問編碼選項，回傳的值在加入佇列時複製一份給工作
fn prompt_encoding_options(term: &Term) -> Result<Option<EncodingOptions>> {
    let theme = ColorfulTheme::default();
    let mut options = EncodingOptions::default();

    let encoders = [EncoderKind::X264, EncoderKind::X265];
    let Some(index) = Select::with_theme(&theme)
        .with_prompt("編碼器")
        .items(&encoders.map(EncoderKind::name))
        .default(0)
        .interact_on_opt(term)?
    else {
        return Ok(None);
    };
    options.encoder = encoders[index];

    let variants = [EncoderVariant::Bit8, EncoderVariant::Bit10];
    let Some(index) = Select::with_theme(&theme)
        .with_prompt("色彩深度")
        .items(&variants.map(EncoderVariant::name))
        .default(0)
        .interact_on_opt(term)?
    else {
        return Ok(None);
    };
    options.variant = variants[index];

    let modes = [
        RateControl::Crf,
        RateControl::Cqp,
        RateControl::Abr,
        RateControl::TwoPass,
    ];
    let Some(index) = Select::with_theme(&theme)
        .with_prompt("位元率控制")
        .items(&modes.map(RateControl::name))
        .default(0)
        .interact_on_opt(term)?
    else {
        return Ok(None);
    };
    options.rate_control = modes[index];

    if options.rate_control.uses_bitrate() {
        options.bitrate = Input::with_theme(&theme)
            .with_prompt("位元率 (kbps)")
            .default(options.bitrate)
            .interact_text()?;
    } else {
        options.quantizer = Input::with_theme(&theme)
            .with_prompt("品質值")
            .default(options.quantizer)
            .interact_text()?;
    }

    options.preset = Input::with_theme(&theme)
        .with_prompt("preset")
        .default(options.preset)
        .interact_text()?;
    options.custom_encoder_args = Input::with_theme(&theme)
        .with_prompt("自訂編碼器參數")
        .allow_empty(true)
        .interact_text()?;
    options.custom_source_args = Input::with_theme(&theme)
        .with_prompt("自訂來源參數（腳本來源）")
        .allow_empty(true)
        .interact_text()?;

    Ok(Some(options))
}

pub fn add_source_file(term: &Term, app: &mut App) -> Result<()> {
    println!("{}", style("=== 新增來源檔案 ===").cyan().bold());

    let source = prompt_path("請輸入來源檔案路徑")?;
    if let Err(e) = validate_file_exists(&source) {
        eprintln!("{} {}", style("錯誤:").red().bold(), e);
        return pause(term);
    }

    let Some(options) = prompt_encoding_options(term)? else {
        return Ok(());
    };

    let default_output = default_output_path(&source, options.encoder);
    let output: String = Input::new()
        .with_prompt("輸出檔案路徑")
        .default(default_output.display().to_string())
        .interact_text()?;
    let output = PathBuf::from(output.trim());
    ensure_parent_exists(&output)?;

    let run_now = Confirm::new()
        .with_prompt("立即開始？")
        .default(false)
        .interact()?;

    let id = app.scheduler.submit_job(&source, &output, options, run_now);
    if let Some(job) = app.scheduler.job(id) {
        println!(
            "{} {} ({})",
            style("已加入:").green(),
            job.display_name,
            job.status()
        );
    }
    pause(term)
}

pub fn add_directory(term: &Term, app: &mut App) -> Result<()> {
    println!("{}", style("=== 新增資料夾內的來源 ===").cyan().bold());

    let directory = prompt_path("請輸入資料夾路徑")?;
    if let Err(e) = validate_directory_exists(&directory) {
        eprintln!("{} {}", style("錯誤:").red().bold(), e);
        return pause(term);
    }

    println!("{}", style("掃描來源檔案中...").dim());
    let sources = scan_source_files(&directory)?;
    if sources.is_empty() {
        println!("{}", style("找不到任何來源檔案").yellow());
        return pause(term);
    }

    println!(
        "{}",
        style(format!("找到 {} 個來源檔案：", sources.len())).green()
    );
    for (index, source) in sources.iter().enumerate() {
        println!(
            "  {}. {} ({:.2} MB)",
            index + 1,
            source.path.display(),
            source.size as f64 / 1024.0 / 1024.0
        );
    }

    let Some(options) = prompt_encoding_options(term)? else {
        return Ok(());
    };

    for source in &sources {
        let output = default_output_path(&source.path, options.encoder);
        app.scheduler
            .submit_job(&source.path, &output, options.clone(), false);
    }
    info!("從 {} 加入 {} 個工作", directory.display(), sources.len());
    println!("{}", style(format!("已加入 {} 個工作", sources.len())).green());
    pause(term)
}

pub fn start_queue(term: &Term, app: &mut App) -> Result<()> {
    let started = app.scheduler.start_next_jobs();
    if started == 0 && !app.scheduler.has_active_jobs() {
        println!("{}", style("沒有等待中的工作").yellow());
        return pause(term);
    }
    monitor_queue(term, app)
}

pub fn monitor_queue(term: &Term, app: &mut App) -> Result<()> {
    if !app.scheduler.has_active_jobs() {
        println!("{}", style("目前沒有執行中的工作").yellow());
        return pause(term);
    }

    println!(
        "{}",
        style("執行中... 按 Ctrl-C 中止所有工作").dim()
    );
    match app.console.monitor(&mut app.scheduler) {
        MonitorOutcome::Idle => println!("{}", style("佇列已執行完畢").green()),
        MonitorOutcome::Interrupted => println!("{}", style("已中止所有工作").yellow()),
    }
    print_queue(&app.scheduler);
    pause(term)
}

fn select_job(term: &Term, scheduler: &Scheduler) -> Result<Option<JobId>> {
    let jobs: Vec<_> = scheduler.jobs().collect();
    if jobs.is_empty() {
        println!("{}", style("佇列是空的").yellow());
        return Ok(None);
    }

    let items: Vec<String> = jobs
        .iter()
        .map(|job| format!("{} [{}] {}%", job.display_name, job.status(), job.progress()))
        .collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("選擇工作")
        .items(&items)
        .default(0)
        .interact_on_opt(term)?;

    Ok(selection.map(|index| jobs[index].id()))
}

pub fn manage_job(term: &Term, app: &mut App) -> Result<()> {
    let Some(id) = select_job(term, &app.scheduler)? else {
        return pause(term);
    };

    let actions = [
        "開始", "暫停", "恢復", "中止", "刪除", "重新開始", "上移", "下移", "檢視日誌",
    ];
    let Some(action) = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("操作")
        .items(&actions)
        .default(0)
        .interact_on_opt(term)?
    else {
        return Ok(());
    };

    let scheduler = &mut app.scheduler;
    let result = match action {
        0 => scheduler.start(id),
        1 => scheduler.pause(id),
        2 => scheduler.resume(id),
        3 => scheduler.abort(id),
        4 => scheduler.delete(id).map(|_| ()),
        5 => scheduler.restart(id).map(|_| ()),
        6 => scheduler.move_job(id, MoveDirection::Up).map(|_| ()),
        7 => scheduler.move_job(id, MoveDirection::Down).map(|_| ()),
        8 => {
            if let Some(job) = scheduler.job(id) {
                println!("{}", style(&job.display_name).cyan().bold());
                println!("{}", job.log_text());
            }
            Ok(())
        }
        _ => unreachable!(),
    };

    match result {
        Ok(()) => println!("{}", style("完成").green()),
        Err(e) => eprintln!("{} {}", style("錯誤:").red().bold(), e),
    }
    pause(term)
}

pub fn save_queue(term: &Term, app: &mut App) -> Result<()> {
    let path = app.config.queue_path();
    match app.scheduler.save_queue(&path) {
        Ok(count) => println!(
            "{}",
            style(format!("已保存 {count} 個工作到 {}", path.display())).green()
        ),
        Err(e) => eprintln!("{} {e:#}", style("錯誤:").red().bold()),
    }
    pause(term)
}

pub fn load_queue(term: &Term, app: &mut App) -> Result<()> {
    let path = app.config.queue_path();
    match app.scheduler.load_queue(&path) {
        Ok(count) => println!("{}", style(format!("已還原 {count} 個工作")).green()),
        Err(e) => eprintln!("{} {e:#}", style("錯誤:").red().bold()),
    }
    pause(term)
}

/// 全部工作完成後關機
pub fn install_shutdown_handler(scheduler: &mut Scheduler) {
    scheduler.set_shutdown_handler(Box::new(|| {
        info!("所有工作已完成，一分鐘後關機");
        let status = if cfg!(windows) {
            Command::new("shutdown").args(["/s", "/t", "60"]).status()
        } else {
            Command::new("shutdown").args(["-h", "+1"]).status()
        };
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => error!("關機指令失敗: {status}"),
            Err(e) => error!("無法執行關機指令: {e}"),
        }
    }));
}
