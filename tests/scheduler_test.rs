//! 排程器整合測試：並行上限、自動執行下一個、中止與佇列保存
#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::fake_x264;
use encode_launcher::config::{Preferences, ToolPaths};
use encode_launcher::job::{EncodingOptions, JobEvent, JobId, JobStatus};
use encode_launcher::scheduler::Scheduler;
use tempfile::tempdir;

const QUICK_ENCODE: &str = r#"echo "[50.0%] 50/100 frames, 25.00 fps, 800.00 kb/s, eta 0:00:01" >&2
sleep 0.2
printf 'data' > "$out"
exit 0"#;

fn preferences() -> Preferences {
    Preferences {
        max_concurrent_jobs: 1,
        auto_run_next: true,
        poll_interval_ms: 50,
        ..Preferences::default()
    }
}

fn submit(scheduler: &mut Scheduler, dir: &Path, name: &str) -> JobId {
    scheduler.submit_job(
        &dir.join(format!("{name}.mkv")),
        &dir.join(format!("{name}.264")),
        EncodingOptions::default(),
        false,
    )
}

/// 處理通知直到工作進入指定狀態
fn wait_for_status(scheduler: &mut Scheduler, id: JobId, status: JobStatus) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while scheduler.job(id).map(|job| job.status()) != Some(status) {
        assert!(Instant::now() < deadline, "等待 {status} 逾時");
        scheduler.process_events(Duration::from_millis(50));
    }
}

#[test]
fn test_queue_runs_one_job_at_a_time_in_order() {
    let dir = tempdir().unwrap();
    let tools = ToolPaths {
        x264: fake_x264(dir.path(), QUICK_ENCODE),
        ..ToolPaths::default()
    };
    let mut scheduler = Scheduler::new(preferences(), tools);
    let events = scheduler.subscribe();

    let ids: Vec<JobId> = ["a", "b", "c"]
        .iter()
        .map(|name| submit(&mut scheduler, dir.path(), name))
        .collect();
    assert_eq!(scheduler.start_next_jobs(), 1);

    let deadline = Instant::now() + Duration::from_secs(30);
    while scheduler.has_active_jobs() {
        assert!(Instant::now() < deadline, "佇列沒有在時限內完成");
        scheduler.process_events(Duration::from_millis(50));
        assert!(scheduler.active_count() <= 1);
    }

    for id in &ids {
        assert_eq!(scheduler.job(*id).unwrap().status(), JobStatus::Completed);
        assert_eq!(scheduler.job(*id).unwrap().progress(), 100);
    }

    let started: Vec<JobId> = events
        .try_iter()
        .filter_map(|event| match event {
            JobEvent::StatusChanged {
                job_id,
                status: JobStatus::Starting,
            } => Some(job_id),
            _ => None,
        })
        .collect();
    assert_eq!(started, ids);
}

#[test]
fn test_run_immediately_respects_concurrency_limit() {
    let dir = tempdir().unwrap();
    let tools = ToolPaths {
        x264: fake_x264(dir.path(), QUICK_ENCODE),
        ..ToolPaths::default()
    };
    let mut scheduler = Scheduler::new(
        Preferences {
            auto_run_next: false,
            ..preferences()
        },
        tools,
    );

    let first = scheduler.submit_job(
        &dir.path().join("a.mkv"),
        &dir.path().join("a.264"),
        EncodingOptions::default(),
        true,
    );
    let second = scheduler.submit_job(
        &dir.path().join("b.mkv"),
        &dir.path().join("b.264"),
        EncodingOptions::default(),
        true,
    );

    assert_eq!(scheduler.job(first).unwrap().status(), JobStatus::Starting);
    assert_eq!(scheduler.job(second).unwrap().status(), JobStatus::Enqueued);

    assert!(scheduler.wait_idle(Duration::from_secs(20)));
    assert_eq!(scheduler.job(first).unwrap().status(), JobStatus::Completed);
    assert_eq!(scheduler.job(second).unwrap().status(), JobStatus::Enqueued);
}

#[test]
fn test_shutdown_handler_runs_once_after_queue_drains() {
    let dir = tempdir().unwrap();
    let tools = ToolPaths {
        x264: fake_x264(dir.path(), QUICK_ENCODE),
        ..ToolPaths::default()
    };
    let mut scheduler = Scheduler::new(
        Preferences {
            max_concurrent_jobs: 2,
            shutdown_on_completion: true,
            ..preferences()
        },
        tools,
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    scheduler.set_shutdown_handler(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    for name in ["a", "b", "c"] {
        submit(&mut scheduler, dir.path(), name);
    }
    scheduler.start_next_jobs();

    assert!(scheduler.wait_idle(Duration::from_secs(30)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_abort_running_job_then_delete() {
    let dir = tempdir().unwrap();
    let tools = ToolPaths {
        x264: fake_x264(
            dir.path(),
            r#"echo "[10.0%] 10/100 frames, 25.00 fps, 800.00 kb/s, eta 0:00:09" >&2
exec sleep 30"#,
        ),
        ..ToolPaths::default()
    };
    let mut scheduler = Scheduler::new(preferences(), tools);
    let id = submit(&mut scheduler, dir.path(), "a");
    scheduler.start(id).unwrap();

    assert!(scheduler.delete(id).is_err());
    wait_for_status(&mut scheduler, id, JobStatus::Running);
    scheduler.abort(id).unwrap();
    assert!(scheduler.wait_idle(Duration::from_secs(20)));

    let job = scheduler.job(id).unwrap();
    assert_eq!(job.status(), JobStatus::Aborted);
    assert!(job.log_text().contains("工作已中止"));

    let restarted = scheduler.restart(id).unwrap();
    assert_eq!(
        scheduler.job(restarted).unwrap().status(),
        JobStatus::Enqueued
    );
    assert!(scheduler.delete(id).is_ok());
    assert_eq!(scheduler.len(), 1);
}

#[test]
fn test_saved_queue_keeps_only_unfinished_jobs() {
    let dir = tempdir().unwrap();
    let tools = ToolPaths {
        x264: fake_x264(dir.path(), QUICK_ENCODE),
        ..ToolPaths::default()
    };
    let queue_path = dir.path().join("queue.json");

    let mut scheduler = Scheduler::new(
        Preferences {
            auto_run_next: false,
            ..preferences()
        },
        tools.clone(),
    );
    let done = submit(&mut scheduler, dir.path(), "done");
    submit(&mut scheduler, dir.path(), "pending");
    scheduler.start(done).unwrap();
    assert!(scheduler.wait_idle(Duration::from_secs(20)));
    assert_eq!(scheduler.job(done).unwrap().status(), JobStatus::Completed);

    assert_eq!(scheduler.save_queue(&queue_path).unwrap(), 1);

    let mut restored = Scheduler::new(preferences(), tools);
    assert_eq!(restored.load_queue(&queue_path).unwrap(), 1);
    let job = restored.jobs().next().unwrap();
    assert_eq!(job.status(), JobStatus::Enqueued);
    assert_eq!(job.source_path(), dir.path().join("pending.mkv"));
    assert_eq!(job.output_path(), dir.path().join("pending.264"));
}

#[test]
fn test_saved_queue_skips_running_jobs() {
    let dir = tempdir().unwrap();
    let tools = ToolPaths {
        x264: fake_x264(
            dir.path(),
            r#"echo "[10.0%] 10/100 frames, 25.00 fps, 800.00 kb/s, eta 0:00:09" >&2
exec sleep 30"#,
        ),
        ..ToolPaths::default()
    };
    let queue_path = dir.path().join("queue.json");

    let mut scheduler = Scheduler::new(
        Preferences {
            auto_run_next: false,
            ..preferences()
        },
        tools.clone(),
    );
    let running = submit(&mut scheduler, dir.path(), "running");
    submit(&mut scheduler, dir.path(), "pending");
    scheduler.start(running).unwrap();
    wait_for_status(&mut scheduler, running, JobStatus::Running);

    assert_eq!(scheduler.save_queue(&queue_path).unwrap(), 1);
    scheduler.abort_all();

    let mut restored = Scheduler::new(preferences(), tools);
    assert_eq!(restored.load_queue(&queue_path).unwrap(), 1);
    let job = restored.jobs().next().unwrap();
    assert_eq!(job.source_path(), dir.path().join("pending.mkv"));
}
