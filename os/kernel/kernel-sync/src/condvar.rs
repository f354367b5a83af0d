use crate::context::assert_may_block;
use crate::{MutexGuard, RawSleepLock, SleepMutex, SpinMutex, WaitQueue};

/// Condition variable paired with a [`SleepMutex`].
pub struct Condvar {
    waiters: SpinMutex<WaitQueue>,
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Condvar {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: SpinMutex::new(WaitQueue::new()),
        }
    }

    /// Releases the mutex behind `guard`, sleeps until signalled, and
    /// re-acquires the mutex before returning.
    ///
    /// Wakeups may be stolen by other lockers; callers re-check their
    /// predicate, e.g. through [`wait_while`](Self::wait_while).
    pub fn wait<'a, T>(
        &self,
        guard: MutexGuard<'a, T, RawSleepLock>,
    ) -> MutexGuard<'a, T, RawSleepLock> {
        assert_may_block("Condvar::wait");
        let mutex = guard.mutex();
        let waiter = self.waiters.lock().enqueue();
        drop(guard);
        waiter.sleep();
        mutex.lock()
    }

    /// Waits until `condition` returns `false`.
    pub fn wait_while<'a, T>(
        &self,
        mut guard: MutexGuard<'a, T, RawSleepLock>,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T, RawSleepLock> {
        while condition(&mut guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wakes one waiter.
    ///
    /// # Panics
    /// If the caller does not hold `mutex`.
    pub fn signal<T>(&self, mutex: &SleepMutex<T>) {
        assert!(mutex.do_i_hold(), "Condvar::signal without holding the mutex");
        self.waiters.lock().wake_one();
    }

    /// Wakes all waiters.
    ///
    /// # Panics
    /// If the caller does not hold `mutex`.
    pub fn broadcast<T>(&self, mutex: &SleepMutex<T>) {
        assert!(
            mutex.do_i_hold(),
            "Condvar::broadcast without holding the mutex"
        );
        self.waiters.lock().wake_all();
    }
}
