use crate::context::{ContextId, assert_may_block, context};
use crate::{RawLock, RawOwned, RawUnlock, SpinMutex, WaitQueue};

/// A lock whose waiters sleep instead of spinning.
///
/// Ownership is tied to the acquiring execution context. Releasing from any
/// other context, or acquiring twice from the owner, panics.
pub struct RawSleepLock {
    state: SpinMutex<SleepState>,
}

struct SleepState {
    owner: Option<ContextId>,
    waiters: WaitQueue,
}

impl Default for RawSleepLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSleepLock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SpinMutex::new(SleepState {
                owner: None,
                waiters: WaitQueue::new(),
            }),
        }
    }
}

impl RawLock for RawSleepLock {
    fn raw_lock(&self) {
        assert_may_block("SleepMutex::lock");
        let me = context().current();
        loop {
            let mut s = self.state.lock();
            match s.owner {
                None => {
                    s.owner = Some(me);
                    return;
                }
                Some(owner) => assert_ne!(owner, me, "sleep lock re-acquired by its owner"),
            }
            let waiter = s.waiters.enqueue();
            drop(s);
            waiter.sleep();
        }
    }

    fn raw_try_lock(&self) -> bool {
        let mut s = self.state.lock();
        if s.owner.is_some() {
            return false;
        }
        s.owner = Some(context().current());
        true
    }
}

impl RawUnlock for RawSleepLock {
    unsafe fn raw_unlock(&self) {
        let mut s = self.state.lock();
        assert_eq!(
            s.owner,
            Some(context().current()),
            "sleep lock released by a context that does not own it"
        );
        s.owner = None;
        s.waiters.wake_one();
    }
}

impl RawOwned for RawSleepLock {
    fn held_by_current(&self) -> bool {
        self.state.lock().owner == Some(context().current())
    }
}
