//! Execution contexts and the return to user mode.

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::proc::Process;
use crate::trapframe::TrapFrame;
use alloc::boxed::Box;
use alloc::sync::Arc;
use kernel_vmem::VirtualAddress;

/// Code a new thread runs.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Creates and retires threads.
pub trait ThreadSystem: Send + Sync {
    /// Starts a thread belonging to `proc` that runs `entry`.
    ///
    /// # Errors
    /// [`Errno::ENOMEM`] if the thread cannot be created.
    fn spawn(&self, name: &str, proc: Arc<Process>, entry: ThreadEntry) -> Result<(), Errno>;

    /// Ends the calling thread.
    fn exit_current(&self) -> !;

    /// The process the calling thread belongs to, or `None` for kernel threads.
    fn current_process(&self) -> Option<Arc<Process>>;
}

/// Where a freshly loaded program starts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UserEntry {
    pub entry: VirtualAddress,
    /// Initial stack pointer; equal to `argv`.
    pub stack: VirtualAddress,
    pub argc: usize,
    pub argv: VirtualAddress,
}

/// The switch into user mode.
pub trait UserMode: Send + Sync {
    /// Resumes a forked child from its trap frame.
    fn enter_forked(&self, kernel: &Arc<Kernel>, tf: TrapFrame) -> !;

    /// Starts a newly loaded program.
    fn enter_new(&self, kernel: &Arc<Kernel>, entry: UserEntry) -> !;
}
