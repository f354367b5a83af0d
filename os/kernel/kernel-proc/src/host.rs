//! Kernel threads backed by OS threads.
//!
//! Every spawned thread records its process in a thread-local slot.
//! [`ThreadSystem::exit_current`] unwinds to the bottom of the thread with a
//! private marker payload, which the thread swallows; any other panic is
//! carried over to [`HostThreads::join_all`].

use crate::errno::Errno;
use crate::proc::Process;
use crate::thread::{ThreadEntry, ThreadSystem};
use kernel_sync::SpinMutex;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

thread_local! {
    static CURRENT: RefCell<Option<Arc<Process>>> = const { RefCell::new(None) };
}

/// Unwind payload of a thread that exited on purpose.
struct ThreadExit;

pub struct HostThreads {
    handles: SpinMutex<Vec<JoinHandle<()>>>,
}

impl Default for HostThreads {
    fn default() -> Self {
        Self::new()
    }
}

impl HostThreads {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handles: SpinMutex::new(Vec::new()),
        }
    }

    /// Makes the calling thread part of `proc`, or a kernel thread for
    /// `None`. Returns the previous process.
    pub fn adopt(&self, proc: Option<Arc<Process>>) -> Option<Arc<Process>> {
        CURRENT.with(|current| current.replace(proc))
    }

    /// Waits until every spawned thread, including threads spawned while
    /// waiting, has finished.
    ///
    /// # Panics
    /// Re-raises the panic of a thread that failed.
    pub fn join_all(&self) {
        loop {
            let batch = core::mem::take(&mut *self.handles.lock());
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(payload) = handle.join() {
                    panic::resume_unwind(payload);
                }
            }
        }
    }
}

impl ThreadSystem for HostThreads {
    fn spawn(&self, name: &str, proc: Arc<Process>, entry: ThreadEntry) -> Result<(), Errno> {
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                CURRENT.with(|current| current.replace(Some(proc)));
                let outcome = panic::catch_unwind(AssertUnwindSafe(entry));
                CURRENT.with(RefCell::take);
                if let Err(payload) = outcome
                    && !payload.is::<ThreadExit>()
                {
                    panic::resume_unwind(payload);
                }
            })
            .map_err(|_| Errno::ENOMEM)?;
        self.handles.lock().push(handle);
        Ok(())
    }

    fn exit_current(&self) -> ! {
        panic::resume_unwind(Box::new(ThreadExit))
    }

    fn current_process(&self) -> Option<Arc<Process>> {
        CURRENT.with(|current| current.borrow().clone())
    }
}
