//! # Kernel Boot Information

use crate::memory::PAGE_SIZE;

/// What the memory manager learns about physical memory at startup.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelBootInfo {
    /// Total physical memory in bytes.
    pub ram_size: u32,

    /// First physical address not occupied by the kernel image and early
    /// boot allocations. Frames below it are never handed out.
    pub first_free: u32,
}

impl KernelBootInfo {
    /// Number of whole frames between the (page-rounded) first free address
    /// and the end of RAM.
    #[must_use]
    pub const fn managed_frames(&self) -> u32 {
        let first = self.first_free.div_ceil(PAGE_SIZE);
        let last = self.ram_size / PAGE_SIZE;
        last.saturating_sub(first)
    }
}
