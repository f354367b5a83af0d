//! `fork`: duplicate the calling process.

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::proc::{Pid, Process};
use crate::trapframe::TrapFrame;
use alloc::sync::Arc;
use log::debug;

impl Kernel {
    /// Creates a child with a copy of the caller's address space, its working
    /// directory and its open files, and resumes it from `tf` with `fork`
    /// returning 0. Returns the child's PID to the parent.
    ///
    /// # Errors
    /// - [`Errno::EMPROC`] if no PID is free.
    /// - [`Errno::ENOMEM`] if the address space or thread cannot be created.
    ///
    /// Nothing of the child survives a failure.
    pub fn sys_fork(self: &Arc<Self>, tf: &TrapFrame) -> Result<Pid, Errno> {
        let parent = self.current_process();
        let child = Arc::new(Process::new(parent.name(), Some(&parent)));
        let pid = self.pids.allocate(&child)?;

        let child_tf = tf.forked_child();
        let started = self.inherit_into(&parent, &child).and_then(|()| {
            self.spawn_thread(parent.name(), &child, move |kernel| {
                kernel.user.enter_forked(kernel, child_tf);
            })
        });
        if let Err(e) = started {
            debug!("fork of {} failed: {e}", parent.pid());
            self.reap(&child);
            return Err(e);
        }

        debug!("{} forked {pid}", parent.pid());
        Ok(pid)
    }

    fn inherit_into(&self, parent: &Process, child: &Process) -> Result<(), Errno> {
        let aspace = parent
            .with_aspace(|aspace| aspace.map(|a| a.copy(self.coremap())).transpose())
            .map_err(|_| Errno::ENOMEM)?;
        child.set_aspace(aspace);
        child.set_cwd(parent.cwd());
        let files = parent.files().inherit();
        *child.files() = files;
        Ok(())
    }
}
