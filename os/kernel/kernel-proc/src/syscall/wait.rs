//! `_exit` and `waitpid`.

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::proc::Pid;
use crate::wait_status::WaitStatus;
use alloc::sync::Arc;
use kernel_vmem::VirtualAddress;
use log::debug;

impl Kernel {
    /// Ends the calling process with exit code `code`.
    pub fn sys_exit(&self, code: i32) -> ! {
        self.exit_with(WaitStatus::exited(code))
    }

    /// Retires the calling thread and publishes `status` to the parent.
    ///
    /// # Panics
    /// When called from a kernel thread.
    pub(crate) fn exit_with(&self, status: WaitStatus) -> ! {
        let proc = self.current_process();
        assert!(
            !Arc::ptr_eq(&proc, self.kernel_process()),
            "kernel threads have no exit status"
        );
        debug!("{} ({}) exits: {status:?}", proc.pid(), proc.name());
        proc.remove_thread();
        proc.announce_exit(status);
        drop(proc);
        self.threads.exit_current()
    }

    /// Blocks until child `pid` has exited, reaps it and returns how it
    /// ended.
    ///
    /// # Errors
    /// - [`Errno::ESRCH`] if `pid` names no process.
    /// - [`Errno::ECHILD`] if it is the caller or not the caller's child.
    /// - [`Errno::EINVAL`] for non-zero `options`.
    pub fn waitpid(&self, pid: Pid, options: i32) -> Result<WaitStatus, Errno> {
        let me = self.current_process();
        let child = self.lookup(pid).ok_or(Errno::ESRCH)?;
        if Arc::ptr_eq(&child, &me) || !child.is_child_of(&me) {
            return Err(Errno::ECHILD);
        }
        if options != 0 {
            return Err(Errno::EINVAL);
        }

        let status = child.wait_for_exit();
        self.reap(&child);
        debug!("{} reaped {pid}: {status:?}", me.pid());
        Ok(status)
    }

    /// [`waitpid`](Self::waitpid), storing the status word at `status` if
    /// one is given. The child is reaped even if the store fails.
    ///
    /// # Errors
    /// As for `waitpid`, plus [`Errno::EFAULT`] if `status` cannot be written.
    pub fn sys_waitpid(
        &self,
        pid: Pid,
        status: Option<VirtualAddress>,
        options: i32,
    ) -> Result<Pid, Errno> {
        let exit = self.waitpid(pid, options)?;
        if let Some(dst) = status {
            #[allow(clippy::cast_sign_loss)]
            let word = exit.raw() as u32;
            self.current_process().with_aspace(|aspace| {
                let aspace = aspace.ok_or(Errno::EFAULT)?;
                self.vmm()
                    .copy_out_word(aspace, dst, word)
                    .map_err(|_| Errno::EFAULT)
            })?;
        }
        Ok(pid)
    }
}
