//! Program image loading.

use crate::errno::Errno;
use crate::fs::Vnode;
use kernel_alloc::Vmm;
use kernel_vmem::{AddressSpace, VirtualAddress};

/// Maps a program image into an address space.
///
/// Implementations define the image's regions, call
/// [`AddressSpace::prepare_load`], write the segments through
/// [`Vmm::copy_out`] and finish with [`AddressSpace::complete_load`].
pub trait ElfLoader: Send + Sync {
    /// Loads `image` and returns its entry point.
    ///
    /// # Errors
    /// [`Errno::ENOEXEC`] for images it cannot run, [`Errno::ENOMEM`] when
    /// memory runs out.
    fn load(
        &self,
        image: &dyn Vnode,
        aspace: &mut AddressSpace,
        vmm: &Vmm<'_>,
    ) -> Result<VirtualAddress, Errno>;
}
