//! 仍在執行的子程序群組登記
//!
//! 每個子程序在 POSIX 上都是自己程序群組的領頭程序，群組編號等於其 pid。
//! 啟動器被終止時以 `terminate_all` 對登記中的群組送出 SIGKILL，
//! 連同已經被移交給 init 的孫程序一起結束。

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::LazyLock;

static LIVE_GROUPS: LazyLock<Mutex<HashSet<u32>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

pub(crate) fn register(group: u32) {
    LIVE_GROUPS.lock().insert(group);
}

pub(crate) fn unregister(group: u32) {
    LIVE_GROUPS.lock().remove(&group);
}

/// 目前登記中的群組編號
#[must_use]
pub fn live_groups() -> Vec<u32> {
    LIVE_GROUPS.lock().iter().copied().collect()
}

/// 對整個程序群組送出 SIGKILL，回傳是否送達
#[cfg(unix)]
pub fn kill_group(group: u32) -> bool {
    use std::process::{Command, Stdio};

    let target = format!("-{group}");
    match Command::new("kill")
        .args(["-s", "KILL", "--", &target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            log::warn!("無法終止程序群組 [{group}]: {e}");
            false
        }
    }
}

/// 沒有程序群組的平台改為終止整棵程序樹
#[cfg(not(unix))]
pub fn kill_group(group: u32) -> bool {
    super::tree::signal_tree(group, sysinfo::Signal::Kill).is_ok()
}

/// 終止所有登記中的群組並清空登記，回傳送達的群組數
pub fn terminate_all() -> usize {
    let groups: Vec<u32> = LIVE_GROUPS.lock().drain().collect();
    groups.into_iter().filter(|group| kill_group(*group)).count()
}
