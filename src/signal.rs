use crate::process::group;
use anyhow::{Context, Result};
use log::warn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 因終止信號結束時的程式結束碼
pub const TERMINATED_EXIT_CODE: i32 = 130;

/// Ctrl-C 旗標；子程序在獨立的程序群組，不會直接收到終端機的中斷
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    raised: Arc<AtomicBool>,
    watched: Arc<AtomicBool>,
}

/// 監看期間的標記，離開範圍時解除
pub struct WatchGuard {
    watched: Arc<AtomicBool>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.watched.store(false, Ordering::SeqCst);
    }
}

/// 收到信號時的處理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// 交給監看中的畫面中止所有工作
    Interrupt,
    /// 終止所有子程序群組後結束程式
    Terminate,
}

impl InterruptSignal {
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// 處理完一次中斷後清除
    pub fn reset(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    /// 標記有畫面正在輪詢旗標
    #[must_use]
    pub fn watch(&self) -> WatchGuard {
        self.watched.store(true, Ordering::SeqCst);
        WatchGuard {
            watched: Arc::clone(&self.watched),
        }
    }

    #[must_use]
    pub fn is_watched(&self) -> bool {
        self.watched.load(Ordering::SeqCst)
    }

    /// 決定如何處理一次信號
    ///
    /// 沒有畫面在輪詢，或上一次中斷還沒被處理時，直接終止。
    pub fn on_signal(&self) -> SignalAction {
        if self.is_watched() && !self.raised.swap(true, Ordering::SeqCst) {
            SignalAction::Interrupt
        } else {
            SignalAction::Terminate
        }
    }
}

/// 安裝 SIGINT、SIGTERM 與 SIGHUP 的處理器
pub fn setup_interrupt_signal() -> Result<InterruptSignal> {
    let signal = InterruptSignal::default();
    let handler_signal = signal.clone();

    ctrlc::set_handler(move || match handler_signal.on_signal() {
        SignalAction::Interrupt => {
            eprintln!("\n收到中斷信號，正在中止執行中的工作...");
        }
        SignalAction::Terminate => {
            let killed = group::terminate_all();
            warn!("收到終止信號，已終止 {killed} 個子程序群組");
            eprintln!("\n收到終止信號，結束程式");
            std::process::exit(TERMINATED_EXIT_CODE);
        }
    })
    .context("無法設定信號處理器")?;

    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_without_watcher_terminates() {
        let signal = InterruptSignal::default();
        assert_eq!(signal.on_signal(), SignalAction::Terminate);
    }

    #[test]
    fn test_watched_signal_interrupts_once() {
        let signal = InterruptSignal::default();
        let guard = signal.watch();
        assert_eq!(signal.on_signal(), SignalAction::Interrupt);
        assert!(signal.is_raised());
        assert_eq!(signal.on_signal(), SignalAction::Terminate);

        signal.reset();
        assert_eq!(signal.on_signal(), SignalAction::Interrupt);

        drop(guard);
        signal.reset();
        assert!(!signal.is_watched());
        assert_eq!(signal.on_signal(), SignalAction::Terminate);
    }
}
