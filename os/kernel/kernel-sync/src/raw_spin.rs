use crate::context::context;
use crate::{RawLock, RawOwned, RawUnlock};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Test-and-test-and-set spin lock that remembers its holder.
pub struct RawSpin {
    held: AtomicBool,
    /// Raw [`ContextId`](crate::ContextId) of the holder, 0 when free.
    holder: AtomicU64,
}

impl Default for RawSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
            holder: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn lock(&self) {
        let me = context().current().get();
        assert_ne!(
            self.holder.load(Ordering::Relaxed),
            me,
            "spin lock re-acquired by its holder"
        );

        // Fast path: try once, then spin with backoff
        while self.held.swap(true, Ordering::Acquire) {
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        self.holder.store(me, Ordering::Relaxed);
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        if self.held.swap(true, Ordering::Acquire) {
            return false;
        }
        self.holder
            .store(context().current().get(), Ordering::Relaxed);
        true
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        assert!(
            self.held_by_current(),
            "spin lock released by a context that does not hold it"
        );
        self.holder.store(0, Ordering::Relaxed);
        self.held.store(false, Ordering::Release);
    }

    #[inline]
    pub fn held_by_current(&self) -> bool {
        self.holder.load(Ordering::Relaxed) == context().current().get()
    }
}

impl RawLock for RawSpin {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }
}

impl RawUnlock for RawSpin {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}

impl RawOwned for RawSpin {
    fn held_by_current(&self) -> bool {
        Self::held_by_current(self)
    }
}
