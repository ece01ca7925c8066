//! 排程端與工作執行緒之間唯一的控制通道：中止訊號、暫停訊號與可恢復的暫停閘門

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 中止訊號
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct GateState {
    pause_requested: bool,
}

/// 可恢復的暫停閘門
///
/// 排程端呼叫 [`PauseGate::request_pause`] 後，工作執行緒自行暫停子程序並在
/// [`PauseGate::wait`] 上阻塞，直到恢復或中止。
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

/// 閘門放行的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRelease {
    Resumed,
    Cancelled,
}

impl PauseGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        let (lock, _) = &*self.inner;
        lock.lock().pause_requested = true;
    }

    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.inner.0.lock().pause_requested
    }

    /// 恢復：清除暫停請求並喚醒等待中的工作執行緒
    pub fn resume(&self) {
        let (lock, condvar) = &*self.inner;
        lock.lock().pause_requested = false;
        condvar.notify_all();
    }

    /// 僅喚醒，不清除暫停請求（中止時使用）
    pub fn wake(&self) {
        let (lock, condvar) = &*self.inner;
        let _state = lock.lock();
        condvar.notify_all();
    }

    /// 阻塞直到恢復或中止
    pub fn wait(&self, cancel: &CancelToken) -> GateRelease {
        let (lock, condvar) = &*self.inner;
        let mut state = lock.lock();

        loop {
            if cancel.is_cancelled() {
                return GateRelease::Cancelled;
            }
            if !state.pause_requested {
                return GateRelease::Resumed;
            }
            // 以逾時等待保護遺失的喚醒
            condvar.wait_for(&mut state, Duration::from_millis(500));
        }
    }
}

/// 單一工作的控制代碼，排程端與工作執行緒各持有一份
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    pub cancel: CancelToken,
    pub gate: PauseGate,
}

impl JobControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 中止並立即放行被暫停的工作執行緒
    pub fn abort(&self) {
        self.cancel.cancel();
        self.gate.wake();
    }

    pub fn pause(&self) {
        self.gate.request_pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.gate.is_pause_requested()
    }

    pub fn wait_while_paused(&self) -> GateRelease {
        self.gate.wait(&self.cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_gate_passes_through_without_pause() {
        let control = JobControl::new();
        assert_eq!(control.wait_while_paused(), GateRelease::Resumed);
    }

    #[test]
    fn test_resume_releases_waiting_worker() {
        let control = JobControl::new();
        control.pause();

        let worker_control = control.clone();
        let worker = thread::spawn(move || worker_control.wait_while_paused());

        thread::sleep(Duration::from_millis(50));
        control.resume();

        assert_eq!(worker.join().unwrap(), GateRelease::Resumed);
        assert!(!control.is_pause_requested());
    }

    #[test]
    fn test_abort_unblocks_paused_worker_immediately() {
        let control = JobControl::new();
        control.pause();

        let worker_control = control.clone();
        let started = Instant::now();
        let worker = thread::spawn(move || worker_control.wait_while_paused());

        thread::sleep(Duration::from_millis(20));
        control.abort();

        assert_eq!(worker.join().unwrap(), GateRelease::Cancelled);
        assert!(started.elapsed() < Duration::from_millis(450));
    }
}
