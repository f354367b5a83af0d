//! Page faults and `sbrk`.

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::wait_status::{SIGSEGV, WaitStatus};
use kernel_alloc::{FaultKind, VmmError};
use kernel_vmem::{PhysicalAddress, VirtualAddress};
use log::warn;

impl Kernel {
    /// Resolves a translation miss of the current process.
    ///
    /// # Errors
    /// See [`Vmm::fault`](kernel_alloc::Vmm::fault).
    pub fn vm_fault(&self, kind: FaultKind, va: VirtualAddress) -> Result<PhysicalAddress, VmmError> {
        self.current_process()
            .with_aspace(|aspace| self.vmm().fault(aspace, kind, va))
    }

    /// The trap handler's entry for faults raised in user mode. A fault
    /// that cannot be resolved kills the process with `SIGSEGV`.
    #[must_use]
    pub fn handle_user_fault(&self, kind: FaultKind, va: VirtualAddress) -> PhysicalAddress {
        match self.vm_fault(kind, va) {
            Ok(frame) => frame,
            Err(e) => {
                let proc = self.current_process();
                warn!(
                    "{} ({}): {kind:?} fault at {va}: {e}, killed",
                    proc.pid(),
                    proc.name()
                );
                drop(proc);
                self.exit_with(WaitStatus::signaled(SIGSEGV))
            }
        }
    }

    /// Moves the current process's heap break by `delta` bytes and returns
    /// the previous break.
    ///
    /// # Errors
    /// - [`Errno::EINVAL`] without an address space or heap, or for a break
    ///   below the heap start.
    /// - [`Errno::ENOMEM`] for a break that reaches the stack.
    pub fn sys_sbrk(&self, delta: i32) -> Result<VirtualAddress, Errno> {
        self.current_process().with_aspace(|aspace| {
            let aspace = aspace.ok_or(Errno::EINVAL)?;
            Ok(self.vmm().sbrk(aspace, delta)?)
        })
    }
}
