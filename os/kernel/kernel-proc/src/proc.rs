//! # Process Record
//!
//! A process owns one address space and a descriptor table, and carries the
//! rendezvous its parent waits on. Scalar fields sit behind a spin lock; the
//! address space and descriptor table have sleep locks of their own because
//! work done under them (copying pages, closing files) may block.
//!
//! ```text
//!  Created ──fork/runprogram──► Running ──exit──► Exited ──wait──► Reaped
//!                                                    │
//!                                                    └─ never waited on: stays in
//!                                                       the PID table (orphan)
//! ```

use crate::file_handle::DescriptorTable;
use crate::fs::Vnode;
use crate::wait_status::WaitStatus;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::fmt;
use core::sync::atomic::{AtomicI32, Ordering};
use kernel_sync::{MutexGuard, RawSleepLock, Semaphore, SleepMutex, SpinMutex};
use kernel_vmem::AddressSpace;

/// Process identifier. User processes get `1..PID_MAX`; the kernel process is 0.
pub type Pid = i32;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProcState {
    Created,
    Running,
    Exited,
    Reaped,
}

struct ProcInner {
    cwd: Option<Arc<dyn Vnode>>,
    threads: usize,
    state: ProcState,
}

pub struct Process {
    name: String,
    pid: AtomicI32,
    parent: Option<Pid>,
    parent_ref: Weak<Process>,
    inner: SpinMutex<ProcInner>,
    aspace: SleepMutex<Option<AddressSpace>>,
    files: SleepMutex<DescriptorTable>,
    exit_sem: Semaphore,
    exit_status: SpinMutex<Option<WaitStatus>>,
}

impl Process {
    /// A process with no PID, no address space and no open files.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: Option<&Arc<Self>>) -> Self {
        Self {
            name: name.into(),
            pid: AtomicI32::new(0),
            parent: parent.map(|p| p.pid()),
            parent_ref: parent.map_or_else(Weak::new, Arc::downgrade),
            inner: SpinMutex::new(ProcInner {
                cwd: None,
                threads: 0,
                state: ProcState::Created,
            }),
            aspace: SleepMutex::new(None),
            files: SleepMutex::new(DescriptorTable::new()),
            exit_sem: Semaphore::new(0),
            exit_status: SpinMutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid.load(Ordering::Acquire)
    }

    pub(crate) fn set_pid(&self, pid: Pid) {
        self.pid.store(pid, Ordering::Release);
    }

    /// PID the parent had when this process was created.
    #[must_use]
    pub const fn parent(&self) -> Option<Pid> {
        self.parent
    }

    /// Whether `proc` is the process that created this one. Compares
    /// identity, so a later process reusing the parent's PID is not it.
    #[must_use]
    pub fn is_child_of(&self, proc: &Arc<Self>) -> bool {
        core::ptr::eq(self.parent_ref.as_ptr(), Arc::as_ptr(proc))
    }

    #[must_use]
    pub fn state(&self) -> ProcState {
        self.inner.lock().state
    }

    pub(crate) fn set_state(&self, state: ProcState) {
        self.inner.lock().state = state;
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads
    }

    pub(crate) fn add_thread(&self) {
        let mut inner = self.inner.lock();
        inner.threads += 1;
        inner.state = ProcState::Running;
    }

    pub(crate) fn remove_thread(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.threads > 0, "{}: thread count underflow", self.name);
        inner.threads -= 1;
    }

    #[must_use]
    pub fn cwd(&self) -> Option<Arc<dyn Vnode>> {
        self.inner.lock().cwd.clone()
    }

    pub(crate) fn set_cwd(&self, cwd: Option<Arc<dyn Vnode>>) -> Option<Arc<dyn Vnode>> {
        core::mem::replace(&mut self.inner.lock().cwd, cwd)
    }

    /// Runs `f` with the address space locked.
    pub fn with_aspace<R>(&self, f: impl FnOnce(Option<&mut AddressSpace>) -> R) -> R {
        f(self.aspace.lock().as_mut())
    }

    #[must_use]
    pub fn has_aspace(&self) -> bool {
        self.aspace.lock().is_some()
    }

    /// Installs `aspace`, returning the previous one.
    pub(crate) fn set_aspace(&self, aspace: Option<AddressSpace>) -> Option<AddressSpace> {
        core::mem::replace(&mut *self.aspace.lock(), aspace)
    }

    /// The descriptor table, locked.
    pub fn files(&self) -> MutexGuard<'_, DescriptorTable, RawSleepLock> {
        self.files.lock()
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<WaitStatus> {
        *self.exit_status.lock()
    }

    /// Records how the process ended and wakes the waiter.
    pub(crate) fn announce_exit(&self, status: WaitStatus) {
        *self.exit_status.lock() = Some(status);
        self.set_state(ProcState::Exited);
        self.exit_sem.release();
    }

    /// Blocks until [`announce_exit`](Self::announce_exit) has run.
    pub(crate) fn wait_for_exit(&self) -> WaitStatus {
        self.exit_sem.acquire();
        self.exit_status()
            .unwrap_or_else(|| panic!("{}: woken without an exit status", self.name))
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("pid", &self.pid())
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}
