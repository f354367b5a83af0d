//! # Kernel synchronization primitives
//!
//! Two families of locks live here:
//!
//! * **Spinning**: [`SpinMutex`] busy-waits and is meant for short critical
//!   sections such as the bookkeeping inside the blocking primitives.
//!   [`Mutex::lock_irq`] additionally masks interrupts for the guard's
//!   lifetime.
//! * **Blocking**: [`Semaphore`], [`SleepMutex`], [`Condvar`] and
//!   [`RwLock`] put the calling execution context to sleep on a
//!   [`WaitQueue`] until they are woken.
//!
//! The crate does not know how execution contexts are scheduled. It reaches
//! the platform through the [`ExecutionContext`] hooks in [`context`], which
//! answer "who am I", "am I in an interrupt handler" and control the local
//! interrupt mask. With the `std` feature a hosted implementation backed by
//! OS threads is installed by default.
//!
//! Misuse is a kernel bug, not a runtime condition: releasing a lock one does
//! not hold, blocking in interrupt context or sleeping with interrupts masked
//! all panic.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod condvar;
pub mod context;
#[cfg(any(test, feature = "std"))]
pub mod host;
pub mod irq;
mod mutex;
mod raw_spin;
mod rwlock;
mod semaphore;
mod sleep_lock;
mod sync_once_cell;
mod wait_queue;

pub use condvar::Condvar;
pub use context::{ContextId, ExecutionContext};
pub use irq::{IrqGuard, IrqMutex};
pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;
pub use rwlock::{READER_QUEUE_THRESHOLD, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use semaphore::Semaphore;
pub use sleep_lock::RawSleepLock;
pub use sync_once_cell::SyncOnceCell;
pub use wait_queue::{WaitQueue, Waiter};

pub type SpinMutex<T> = Mutex<T, RawSpin>;
pub type SleepMutex<T> = Mutex<T, RawSleepLock>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

impl<T> SleepMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSleepLock::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
}

pub trait RawUnlock {
    unsafe fn raw_unlock(&self);
}

/// A raw lock that knows which execution context holds it.
pub trait RawOwned {
    fn held_by_current(&self) -> bool;
}
