//! Small synchronization helpers shared across the crate.
//!
//! [`BusyLock`] interlocks change-feed callbacks with shutdown, and
//! [`InitGate`] is the single-shot barrier that gates every manager
//! operation until startup has resolved.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::watch;

/// Flag bit marking a [`BusyLock`] as blocked. The remaining bits hold the
/// number of active permits.
const BLOCKED: i64 = i64::MIN;

/// A spin-style busy lock.
///
/// Callbacks acquire a non-blocking permit with [`try_enter`] and release it
/// with [`leave`]; if the lock is blocked they must skip their work entirely.
/// Shutdown calls [`block`], which excludes new entrants and then drains the
/// permits already handed out.
///
/// [`try_enter`]: BusyLock::try_enter
/// [`leave`]: BusyLock::leave
/// [`block`]: BusyLock::block
#[derive(Debug, Default)]
pub struct BusyLock {
    state: AtomicI64,
}

impl BusyLock {
    /// Create an unblocked lock with no active permits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire a permit. Returns `false` once the lock is blocked.
    pub fn try_enter(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);

        loop {
            if cur & BLOCKED != 0 {
                return false;
            }

            match self.state.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Release a permit previously acquired with [`BusyLock::try_enter`].
    pub fn leave(&self) {
        let prev = self.state.fetch_sub(1, Ordering::AcqRel);

        debug_assert_ne!(prev & !BLOCKED, 0, "leave without matching enter");
    }

    /// Block the lock: refuse new permits, then wait until every
    /// outstanding permit has been released.
    pub async fn block(&self) {
        self.state.fetch_or(BLOCKED, Ordering::AcqRel);

        while self.state.load(Ordering::Acquire) != BLOCKED {
            tokio::task::yield_now().await;
        }
    }

    /// Whether [`BusyLock::block`] has been called.
    pub fn is_blocked(&self) -> bool {
        self.state.load(Ordering::Acquire) & BLOCKED != 0
    }
}

/// Resolution of an [`InitGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Initialization has not completed yet.
    Pending,
    /// Initialization succeeded.
    Ready,
    /// Initialization ran and failed.
    Failed,
}

/// A single-shot initialization barrier.
///
/// All operations suspend on [`InitGate::wait`] until the startup routine
/// resolves the gate to either [`InitState::Ready`] or [`InitState::Failed`].
/// Once resolved the gate never changes again.
#[derive(Debug)]
pub struct InitGate {
    state: watch::Sender<InitState>,
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGate {
    /// Create a pending gate.
    pub fn new() -> Self {
        let (state, _) = watch::channel(InitState::Pending);

        Self { state }
    }

    /// Resolve the gate as successfully initialized.
    pub fn set_ready(&self) {
        self.resolve(InitState::Ready);
    }

    /// Resolve the gate as failed.
    pub fn set_failed(&self) {
        self.resolve(InitState::Failed);
    }

    fn resolve(&self, next: InitState) {
        self.state.send_if_modified(|cur| {
            // First resolution wins; the gate is single-shot.
            if *cur == InitState::Pending {
                *cur = next;
                true
            } else {
                false
            }
        });
    }

    /// Current state without waiting.
    pub fn state(&self) -> InitState {
        *self.state.borrow()
    }

    /// Suspend until the gate resolves.
    ///
    /// Returns `None` if the gate was dropped while still pending, which
    /// callers surface as an interrupted wait.
    pub async fn wait(&self) -> Option<InitState> {
        let mut rx = self.state.subscribe();

        loop {
            let cur = *rx.borrow_and_update();

            if cur != InitState::Pending {
                return Some(cur);
            }

            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn busy_lock_enter_leave() {
        let lock = BusyLock::new();

        assert!(lock.try_enter());
        assert!(lock.try_enter());
        lock.leave();
        lock.leave();
        assert!(!lock.is_blocked());
    }

    #[tokio::test]
    async fn busy_lock_block_excludes_entrants() {
        let lock = BusyLock::new();

        lock.block().await;

        assert!(lock.is_blocked());
        assert!(!lock.try_enter());
    }

    #[tokio::test]
    async fn busy_lock_block_drains_permits() {
        let lock = Arc::new(BusyLock::new());

        assert!(lock.try_enter());

        let blocker = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.block().await;
            })
        };

        // New entrants are refused as soon as block is requested.
        tokio::task::yield_now().await;
        assert!(!lock.try_enter());

        lock.leave();
        blocker.await.unwrap();
        assert!(lock.is_blocked());
    }

    #[tokio::test]
    async fn init_gate_releases_waiters() {
        let gate = Arc::new(InitGate::new());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        gate.set_ready();

        assert_eq!(waiter.await.unwrap(), Some(InitState::Ready));
        assert_eq!(gate.state(), InitState::Ready);
    }

    #[tokio::test]
    async fn init_gate_is_single_shot() {
        let gate = InitGate::new();

        gate.set_failed();
        gate.set_ready();

        assert_eq!(gate.state(), InitState::Failed);
        assert_eq!(gate.wait().await, Some(InitState::Failed));
    }

    #[tokio::test]
    async fn init_gate_pending_keeps_waiters_suspended() {
        let gate = InitGate::new();

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), gate.wait()).await;

        assert!(waited.is_err(), "pending gate must not release waiters");
    }
}
