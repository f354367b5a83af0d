//! # Virtual Memory Support
//!
//! Per-process virtual memory for a 32-bit machine with a software-refilled
//! translation cache.
//!
//! ## What you get
//! - [`VirtualAddress`]/[`PhysicalAddress`] newtypes (u32) to avoid mixing
//!   address kinds.
//! - A two-level [`PageTableTree`] whose directory and tables live in
//!   physical frames.
//! - An [`AddressSpace`] tying the page tables to the process's regions,
//!   heap and stack window.
//! - A model of the hardware [`TranslationCache`].
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  Dir  | Table | Offset |
//! ```
//!
//! ```text
//!  Directory  →  Table  →  Physical Page
//!      │            │
//!      │            └───► PTE  (valid + frame number) → maps 4 KiB page
//!      └────────────────► PDE  (present + table frame) → covers 4 MiB
//! ```
//!
//! Both levels are sparse. A directory slot stays empty until some page in
//! its 4 MiB window is referenced, and a table slot stays empty until that
//! page is referenced. An instantiated entry may still be unbacked: the
//! frame is allocated on the first fault, not when the entry is created.
//!
//! The hardware never walks these tables. Misses trap into the kernel, which
//! walks them in software and installs the result in the
//! [`TranslationCache`].

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod addresses;
pub mod page_table;
pub mod tlb;

extern crate alloc;

pub use crate::address_space::{AddressSpace, Region, RegionPermissions, Segment};
pub use crate::addresses::{PhysicalAddress, VirtualAddress};
pub use crate::page_table::{Direction, PageTableEntry, PageTableTree};
pub use crate::tlb::TranslationCache;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_info::memory::PAGE_SIZE;

/// Errors raised while building or changing an address space.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("region overlaps an existing region")]
    Overlap,
    #[error("invalid virtual address range")]
    InvalidRange,
}

/// What a frame is used for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameKind {
    /// Kernel-owned (page tables, kernel pages); never handed to user space.
    Kernel,
    /// Backs a user page.
    User,
}

/// Physical frame allocator.
///
/// Returned frames are page aligned and zero-filled, and never the frame at
/// physical address 0, which page-table entries use as "no frame".
pub trait FrameAlloc {
    /// Allocates one frame, or `None` when memory is exhausted.
    fn allocate_one(&self, kind: FrameKind) -> Option<PhysicalAddress>;

    /// Allocates `count` physically contiguous frames and returns the first.
    fn allocate_run(&self, kind: FrameKind, count: usize) -> Option<PhysicalAddress>;

    /// Releases the allocation starting at `base`.
    fn free(&self, base: PhysicalAddress);
}

/// Converts physical addresses to pointers usable by the kernel (e.g., via
/// a direct-mapped window).
///
/// # Safety
/// Implementors guarantee that for every physical address inside managed
/// RAM, [`phys_to_ptr`](Self::phys_to_ptr) returns a pointer valid for reads
/// and writes up to the end of that address's frame, and that they panic for
/// addresses outside RAM. The provided methods rely on this.
pub unsafe trait PhysMapper {
    /// Convert a *physical* address to a usable mutable pointer.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// Convert a *physical* address to a typed reference.
    ///
    /// # Safety
    /// `pa` must be aligned for `T` and hold a valid `T`, and no other
    /// reference to those bytes may be used during `'a`.
    #[allow(clippy::cast_ptr_alignment)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr(pa).cast::<T>() }
    }

    /// Fill a whole frame with zeros.
    fn zero_frame(&self, frame: PhysicalAddress) {
        debug_assert!(frame.is_page_aligned());
        unsafe { core::ptr::write_bytes(self.phys_to_ptr(frame), 0, PAGE_SIZE as usize) }
    }

    /// Copy the contents of frame `src` into frame `dst`.
    fn copy_frame(&self, dst: PhysicalAddress, src: PhysicalAddress) {
        debug_assert!(dst.is_page_aligned() && src.is_page_aligned());
        assert_ne!(dst, src, "frame copied onto itself");
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.phys_to_ptr(src),
                self.phys_to_ptr(dst),
                PAGE_SIZE as usize,
            );
        }
    }

    /// Read `buf.len()` bytes at `pa`; the range must not cross a frame.
    fn read_phys(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        assert!(pa.page_offset() as usize + buf.len() <= PAGE_SIZE as usize);
        unsafe { core::ptr::copy_nonoverlapping(self.phys_to_ptr(pa), buf.as_mut_ptr(), buf.len()) }
    }

    /// Write `bytes` at `pa`; the range must not cross a frame.
    fn write_phys(&self, pa: PhysicalAddress, bytes: &[u8]) {
        assert!(pa.page_offset() as usize + bytes.len() <= PAGE_SIZE as usize);
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.phys_to_ptr(pa), bytes.len()) }
    }
}

/// Everything the page tables need from physical memory.
pub trait PhysMemory: FrameAlloc + PhysMapper {}

impl<T: FrameAlloc + PhysMapper> PhysMemory for T {}
