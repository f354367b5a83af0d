use crate::context::assert_may_block;
use crate::{SpinMutex, WaitQueue};
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

/// Once this many readers are waiting, a writer stops deferring to new
/// readers, and new readers stop deferring to queued writers.
pub const READER_QUEUE_THRESHOLD: usize = 20;

/// Reader/writer lock with a soft writer preference.
///
/// Any number of readers or a single writer may hold the lock.
///
/// * A reader waits while a writer holds the lock, or while writers are
///   waiting and fewer than [`READER_QUEUE_THRESHOLD`] readers are waiting.
///   A writer counts as waiting from the moment it asks until it holds the
///   lock, including while it is awake and re-checking.
/// * A writer waits while anyone holds the lock, or while at least
///   [`READER_QUEUE_THRESHOLD`] readers are waiting.
///
/// Every release wakes one queued writer and all queued readers, who then
/// re-check their condition.
pub struct RwLock<T> {
    state: SpinMutex<RwState>,
    value: UnsafeCell<T>,
}

struct RwState {
    readers: usize,
    writer: bool,
    waiting_readers: usize,
    waiting_writers: usize,
    reader_queue: WaitQueue,
    writer_queue: WaitQueue,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl RwState {
    fn reader_must_wait(&self) -> bool {
        self.writer
            || (self.waiting_writers > 0 && self.waiting_readers < READER_QUEUE_THRESHOLD)
    }

    fn writer_must_wait(&self) -> bool {
        self.writer || self.readers > 0 || self.waiting_readers >= READER_QUEUE_THRESHOLD
    }

    fn wake_candidates(&mut self) {
        self.writer_queue.wake_one();
        self.reader_queue.wake_all();
    }
}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: SpinMutex::new(RwState {
                readers: 0,
                writer: false,
                waiting_readers: 0,
                waiting_writers: 0,
                reader_queue: WaitQueue::new(),
                writer_queue: WaitQueue::new(),
            }),
            value: UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        assert_may_block("RwLock::read");
        let mut s = self.state.lock();
        s.waiting_readers += 1;
        while s.reader_must_wait() {
            let waiter = s.reader_queue.enqueue();
            drop(s);
            waiter.sleep();
            s = self.state.lock();
        }
        s.waiting_readers -= 1;
        s.readers += 1;
        RwLockReadGuard { lock: self }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        assert_may_block("RwLock::write");
        let mut s = self.state.lock();
        s.waiting_writers += 1;
        while s.writer_must_wait() {
            let waiter = s.writer_queue.enqueue();
            drop(s);
            waiter.sleep();
            s = self.state.lock();
        }
        s.waiting_writers -= 1;
        s.writer = true;
        RwLockWriteGuard { lock: self }
    }

    /// Number of readers currently holding the lock.
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    /// Number of readers that asked for the lock and do not have it yet.
    pub fn waiting_readers(&self) -> usize {
        self.state.lock().waiting_readers
    }

    /// Number of writers that asked for the lock and do not have it yet.
    pub fn waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers
    }

    fn release_read(&self) {
        let mut s = self.state.lock();
        assert!(s.readers > 0, "RwLock read release without readers");
        s.readers -= 1;
        s.wake_candidates();
    }

    fn release_write(&self) {
        let mut s = self.state.lock();
        assert!(s.writer, "RwLock write release without a writer");
        s.writer = false;
        s.wake_candidates();
    }
}

pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share() {
        let l = RwLock::new(5);
        let a = l.read();
        let b = l.read();
        assert_eq!(*a + *b, 10);
        assert_eq!(l.readers(), 2);
        drop(a);
        drop(b);
        assert_eq!(l.readers(), 0);
    }

    #[test]
    fn writer_after_readers_leave() {
        let l = RwLock::new(Vec::new());
        drop(l.read());
        l.write().push(1);
        assert_eq!(l.read().as_slice(), &[1]);
    }
}
