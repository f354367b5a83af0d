use crate::context::assert_may_block;
use crate::{SpinMutex, WaitQueue};

/// Counting semaphore.
///
/// [`acquire`](Self::acquire) sleeps while the count is zero and then
/// decrements it; [`release`](Self::release) increments it and wakes one
/// sleeper. Wakeup order is unspecified: a woken sleeper re-checks the count
/// and may lose the race to a newcomer.
pub struct Semaphore {
    state: SpinMutex<SemaphoreState>,
}

struct SemaphoreState {
    count: usize,
    waiters: WaitQueue,
}

impl Semaphore {
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self {
            state: SpinMutex::new(SemaphoreState {
                count,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// The `P` operation.
    ///
    /// # Panics
    /// When called from a context that may not block.
    pub fn acquire(&self) {
        assert_may_block("Semaphore::acquire");
        loop {
            let mut s = self.state.lock();
            if s.count > 0 {
                s.count -= 1;
                return;
            }
            let waiter = s.waiters.enqueue();
            drop(s);
            waiter.sleep();
        }
    }

    /// Decrements the count if that is possible without sleeping.
    pub fn try_acquire(&self) -> bool {
        let mut s = self.state.lock();
        if s.count == 0 {
            return false;
        }
        s.count -= 1;
        true
    }

    /// The `V` operation.
    pub fn release(&self) {
        let mut s = self.state.lock();
        s.count = s
            .count
            .checked_add(1)
            .unwrap_or_else(|| panic!("semaphore count overflow"));
        s.waiters.wake_one();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.state.lock().count
    }
}
