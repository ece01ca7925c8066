//! 以 sysinfo 列舉子程序樹，對整棵樹送出暫停、恢復或終止訊號

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// 取得 `root` 及其所有子孫程序，父程序排在子程序之前
#[must_use]
pub fn collect_tree(system: &System, root: u32) -> Vec<Pid> {
    let mut tree = vec![Pid::from_u32(root)];
    let mut index = 0;

    while index < tree.len() {
        let parent = tree[index];
        let children: Vec<Pid> = system
            .processes()
            .iter()
            .filter(|(pid, process)| {
                process.parent() == Some(parent)
                    && process.thread_kind().is_none()
                    && !tree.contains(pid)
            })
            .map(|(pid, _)| *pid)
            .collect();
        tree.extend(children);
        index += 1;
    }

    tree
}

/// 對整棵程序樹送出訊號，回傳成功送達的程序數
///
/// 根程序無法送達時回傳錯誤（例如平台不支援該訊號）。
pub fn signal_tree(root: u32, signal: Signal) -> Result<usize, String> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let tree = collect_tree(&system, root);
    let mut delivered = 0;

    for pid in &tree {
        let Some(process) = system.process(*pid) else {
            continue;
        };
        match process.kill_with(signal) {
            Some(true) => delivered += 1,
            Some(false) => log::debug!("訊號 {signal:?} 未送達程序 [{pid}]"),
            None if pid.as_u32() == root => {
                return Err(format!("此平台不支援訊號 {signal:?}"));
            }
            None => {}
        }
    }

    if delivered == 0 {
        return Err(format!("找不到程序 [{root}]"));
    }

    Ok(delivered)
}

/// 終止 `root` 的所有子孫程序（不含根程序本身）
pub fn kill_descendants(root: u32) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    collect_tree(&system, root)
        .into_iter()
        .skip(1)
        .rev()
        .filter_map(|pid| system.process(pid))
        .filter(|process| process.kill_with(Signal::Kill).unwrap_or(false))
        .count()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_collect_tree_finds_grandchildren() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 5 & sleep 5; wait"])
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let tree = collect_tree(&system, child.id());
        assert_eq!(tree[0].as_u32(), child.id());
        assert!(tree.len() >= 3, "tree: {tree:?}");

        assert!(kill_descendants(child.id()) >= 2);
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
