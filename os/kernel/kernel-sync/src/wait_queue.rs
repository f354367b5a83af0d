use crate::context::{assert_may_block, context};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

/// A queue of sleeping execution contexts.
///
/// A wait queue is always owned by some lock-protected state. A sleeper
/// enqueues itself while holding that lock, releases the lock, then calls
/// [`Waiter::sleep`]. A waker holding the lock dequeues and wakes sleepers.
/// Because the token is queued before the lock is released, a wakeup issued
/// between the release and the sleep is not lost.
#[derive(Default)]
pub struct WaitQueue {
    sleepers: VecDeque<Arc<AtomicBool>>,
}

/// A queued sleeper's half of a wakeup.
#[must_use = "a waiter must sleep or its wakeup is lost"]
pub struct Waiter {
    woken: Arc<AtomicBool>,
}

impl WaitQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sleepers: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self) -> Waiter {
        let woken = Arc::new(AtomicBool::new(false));
        self.sleepers.push_back(Arc::clone(&woken));
        Waiter { woken }
    }

    /// Wakes one sleeper. Returns `false` if nobody was waiting.
    pub fn wake_one(&mut self) -> bool {
        self.sleepers.pop_front().is_some_and(|w| {
            w.store(true, Ordering::Release);
            true
        })
    }

    /// Wakes every sleeper and returns how many there were.
    pub fn wake_all(&mut self) -> usize {
        let n = self.sleepers.len();
        for w in self.sleepers.drain(..) {
            w.store(true, Ordering::Release);
        }
        n
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sleepers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sleepers.len()
    }
}

impl Waiter {
    /// Blocks until woken.
    ///
    /// # Panics
    /// In interrupt context, or with interrupts disabled.
    pub fn sleep(self) {
        assert_may_block("wait queue");
        let hooks = context();
        while !self.woken.load(Ordering::Acquire) {
            hooks.relax();
        }
    }
}
