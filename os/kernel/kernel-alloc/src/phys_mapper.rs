//! # Physical Memory Window
//!
//! This module provides the [`PhysMapper`] implementation the memory manager
//! uses to touch frames. Physical memory is modelled as one contiguous,
//! page-aligned block, and physical address `pa` lives at `base + pa`. This
//! is the same fixed-offset scheme as a direct-mapped kernel segment, so the
//! page-table and fault-handling code above it does not care whether the
//! block is real RAM or a host allocation.
//!
//! ## Why is this needed?
//! - Code can only dereference virtual addresses, not physical ones.
//! - Page tables, zero-filling and fork's frame copies all need to "see" a
//!   frame by its physical address.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::PhysicalMemory;
//! use kernel_vmem::{PhysMapper, PhysicalAddress};
//!
//! let ram = PhysicalMemory::new(16 * 4096);
//! let pa = PhysicalAddress::new(3 * 4096 + 8);
//! ram.write_phys(pa, b"hello");
//! let mut buf = [0u8; 5];
//! ram.read_phys(pa, &mut buf);
//! assert_eq!(&buf, b"hello");
//! ```

use alloc::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use core::ptr::NonNull;
use kernel_info::memory::PAGE_SIZE;
use kernel_vmem::{PhysMapper, PhysicalAddress};

/// A zero-initialized block of "physical" memory starting at address 0.
pub struct PhysicalMemory {
    base: NonNull<u8>,
    size: u32,
}

// SAFETY: the block is plain bytes; callers coordinate access per frame.
unsafe impl Send for PhysicalMemory {}
unsafe impl Sync for PhysicalMemory {}

impl PhysicalMemory {
    /// Allocates `size` bytes of zeroed memory.
    ///
    /// # Panics
    /// If `size` is zero or not a multiple of the page size.
    #[must_use]
    pub fn new(size: u32) -> Self {
        assert!(
            size > 0 && size.is_multiple_of(PAGE_SIZE),
            "RAM size {size:#x} is not a positive multiple of the page size"
        );
        let layout = Self::layout(size);
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));
        Self { base, size }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    fn layout(size: u32) -> Layout {
        Layout::from_size_align(size as usize, PAGE_SIZE as usize)
            .unwrap_or_else(|_| panic!("invalid RAM layout"))
    }
}

impl Drop for PhysicalMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.base.as_ptr(), Self::layout(self.size)) }
    }
}

// SAFETY: every address below `size` maps into the block; others panic.
unsafe impl PhysMapper for PhysicalMemory {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(
            pa.as_u32() < self.size,
            "physical address {pa} outside RAM"
        );
        // SAFETY: in bounds per the check above.
        unsafe { self.base.as_ptr().add(pa.as_u32() as usize) }
    }
}
