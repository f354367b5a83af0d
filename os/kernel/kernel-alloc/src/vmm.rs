//! Virtual Memory Manager (VMM) for user address spaces.
//!
//! The VMM ties an [`AddressSpace`] to the [`Coremap`] that backs it and the
//! [`TranslationCache`] that caches its translations. It resolves faults by
//! materializing pages on first touch, moves the heap break, and copies data
//! between kernel buffers and user memory.
//!
//! # Example
//! ```rust
//! use kernel_alloc::frame_alloc::Coremap;
//! use kernel_alloc::phys_mapper::PhysicalMemory;
//! use kernel_alloc::vmm::{FaultKind, Vmm};
//! use kernel_info::boot::KernelBootInfo;
//! use kernel_vmem::{AddressSpace, RegionPermissions, TranslationCache, VirtualAddress};
//!
//! let ram = PhysicalMemory::new(64 * 4096);
//! let coremap = Coremap::bootstrap(ram, &KernelBootInfo { ram_size: 64 * 4096, first_free: 4096 });
//! let tlb = TranslationCache::new();
//! let vmm = Vmm::new(&coremap, &tlb);
//!
//! let mut aspace = AddressSpace::create(&coremap).unwrap();
//! let text = VirtualAddress::new(0x0040_0000);
//! aspace.define_region(text, 4096, RegionPermissions::from_flags(true, false, true)).unwrap();
//!
//! let frame = vmm.fault(Some(&mut aspace), FaultKind::Read, text).unwrap();
//! assert_eq!(tlb.translate(text), Some(frame));
//! ```

use crate::frame_alloc::Coremap;
use alloc::string::String;
use alloc::vec::Vec;
use kernel_info::memory::{PAGE_SIZE, SBRK_MAX_SHRINK, USERSPACE_TOP};
use kernel_vmem::{
    AddressSpace, FrameAlloc, FrameKind, PageTableEntry, PhysMapper, PhysicalAddress,
    TranslationCache, VirtualAddress, VmError,
};
use log::{debug, trace};

/// Why the translation hardware trapped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultKind {
    Read,
    Write,
    /// Write to a page the cache holds as read-only. Entries are always
    /// installed writable, so this is resolved like any other miss.
    ReadOnly,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error("no address space")]
    NoAddressSpace,
    #[error("segmentation fault at {0}")]
    SegmentationFault(VirtualAddress),
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("string longer than {0} bytes")]
    NameTooLong(usize),
}

impl From<VmError> for VmmError {
    fn from(value: VmError) -> Self {
        match value {
            VmError::OutOfMemory => Self::OutOfMemory,
            VmError::Overlap | VmError::InvalidRange => Self::InvalidArgument,
        }
    }
}

/// User virtual memory manager.
#[derive(Copy, Clone)]
pub struct Vmm<'m> {
    coremap: &'m Coremap,
    tlb: &'m TranslationCache,
}

impl<'m> Vmm<'m> {
    #[must_use]
    pub const fn new(coremap: &'m Coremap, tlb: &'m TranslationCache) -> Self {
        Self { coremap, tlb }
    }

    #[inline]
    #[must_use]
    pub const fn coremap(&self) -> &'m Coremap {
        self.coremap
    }

    #[inline]
    #[must_use]
    pub const fn tlb(&self) -> &'m TranslationCache {
        self.tlb
    }

    /// Handles a translation miss at `va` and installs the result.
    ///
    /// # Errors
    /// - [`VmmError::NoAddressSpace`] for faults raised by kernel threads.
    /// - [`VmmError::SegmentationFault`] if `va` is in no segment.
    /// - [`VmmError::OutOfMemory`] if no frame or page table is available.
    pub fn fault(
        &self,
        aspace: Option<&mut AddressSpace>,
        kind: FaultKind,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, VmmError> {
        let aspace = aspace.ok_or(VmmError::NoAddressSpace)?;
        let frame = self.resolve(aspace, va)?;
        let slot = self.tlb.install(va, frame);
        trace!("{kind:?} fault at {va} -> {frame} (slot {slot})");
        Ok(frame)
    }

    /// Returns the frame backing `va`'s page, instantiating the page-table
    /// entry and allocating a zeroed frame as needed.
    ///
    /// # Errors
    /// As for [`fault`](Self::fault), minus the missing address space.
    pub fn resolve(
        &self,
        aspace: &mut AddressSpace,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, VmmError> {
        let mem = self.coremap;
        let page = va.page_base();
        let segment = aspace
            .classify(va)
            .ok_or(VmmError::SegmentationFault(va))?;

        let table = aspace.page_table_mut();
        if table.find_entry(mem, page).is_none() {
            table.ensure_entries(mem, page, 1, segment.growth())?;
        }
        let Some(entry) = table.find_entry_mut(mem, page) else {
            unreachable!("entry for {page} was just instantiated");
        };
        if let Some(frame) = entry.frame() {
            return Ok(frame);
        }

        let frame = mem
            .allocate_one(FrameKind::User)
            .ok_or(VmmError::OutOfMemory)?;
        *entry = PageTableEntry::backed(frame);
        trace!("{segment:?} page {page} backed by {frame}");
        Ok(frame)
    }

    /// Makes `aspace` current. Switching to a kernel thread (`None`) keeps
    /// the cache as it is.
    pub fn activate(&self, aspace: Option<&AddressSpace>) {
        if aspace.is_some() {
            self.tlb.shootdown_all();
        }
    }

    /// Drops every cached translation of the outgoing address space.
    pub fn deactivate(&self) {
        self.tlb.shootdown_all();
    }

    /// Moves the heap break by `delta` bytes and returns the old break.
    ///
    /// Shrinking releases every page that lies wholly above the new break.
    ///
    /// # Errors
    /// - [`VmmError::InvalidArgument`] without a heap, when the break would
    ///   drop below the heap start, or when `delta` shrinks by 1 GiB or more.
    /// - [`VmmError::OutOfMemory`] when the break would reach the stack
    ///   window or leave user space.
    pub fn sbrk(&self, aspace: &mut AddressSpace, delta: i32) -> Result<VirtualAddress, VmmError> {
        let heap = aspace.heap().ok_or(VmmError::InvalidArgument)?;
        let old = heap.end();
        if delta == 0 {
            return Ok(old);
        }
        if i64::from(delta) <= -SBRK_MAX_SHRINK {
            return Err(VmmError::InvalidArgument);
        }

        let new = i64::from(old.as_u32()) + i64::from(delta);
        if new < i64::from(heap.start().as_u32()) {
            return Err(VmmError::InvalidArgument);
        }
        if new >= i64::from(aspace.stack_bottom().as_u32()) || new > i64::from(USERSPACE_TOP) {
            return Err(VmmError::OutOfMemory);
        }
        let new = VirtualAddress::new(u32::try_from(new).map_err(|_| VmmError::OutOfMemory)?);

        if new < old {
            self.release_pages(aspace, new, old);
        }
        aspace.set_break(new);
        debug!("break moved from {old} to {new}");
        Ok(old)
    }

    /// Unmaps the backed pages in `[round_up(from), round_up(to))`.
    fn release_pages(&self, aspace: &mut AddressSpace, from: VirtualAddress, to: VirtualAddress) {
        let (Some(first), Some(last)) = (from.page_round_up(), to.page_round_up()) else {
            return;
        };
        let mut released = 0usize;
        for page in (first.as_u32()..last.as_u32()).step_by(PAGE_SIZE as usize) {
            let page = VirtualAddress::new(page);
            if aspace.page_table_mut().unmap(self.coremap, page).is_some() {
                self.tlb.evict(page);
                released += 1;
            }
        }
        trace!("heap shrink released {released} pages");
    }

    /// Copies `src` to user memory at `dst`, page by page.
    ///
    /// # Errors
    /// Any fault error for a page in the destination range.
    pub fn copy_out(
        &self,
        aspace: &mut AddressSpace,
        dst: VirtualAddress,
        src: &[u8],
    ) -> Result<(), VmmError> {
        self.for_each_chunk(aspace, dst, src.len(), |pa, done, len| {
            self.coremap.write_phys(pa, &src[done..done + len]);
        })
    }

    /// Copies user memory at `src` into `dst`.
    ///
    /// # Errors
    /// Any fault error for a page in the source range.
    pub fn copy_in(
        &self,
        aspace: &mut AddressSpace,
        src: VirtualAddress,
        dst: &mut [u8],
    ) -> Result<(), VmmError> {
        let len = dst.len();
        self.for_each_chunk(aspace, src, len, |pa, done, n| {
            self.coremap.read_phys(pa, &mut dst[done..done + n]);
        })
    }

    /// Reads one big-endian word.
    ///
    /// # Errors
    /// As for [`copy_in`](Self::copy_in).
    pub fn copy_in_word(&self, aspace: &mut AddressSpace, va: VirtualAddress) -> Result<u32, VmmError> {
        let mut word = [0u8; 4];
        self.copy_in(aspace, va, &mut word)?;
        Ok(u32::from_be_bytes(word))
    }

    /// Writes one big-endian word.
    ///
    /// # Errors
    /// As for [`copy_out`](Self::copy_out).
    pub fn copy_out_word(
        &self,
        aspace: &mut AddressSpace,
        va: VirtualAddress,
        value: u32,
    ) -> Result<(), VmmError> {
        self.copy_out(aspace, va, &value.to_be_bytes())
    }

    /// Reads a NUL-terminated string of at most `max` bytes, terminator
    /// included.
    ///
    /// # Errors
    /// - [`VmmError::NameTooLong`] if no terminator is found within `max` bytes.
    /// - [`VmmError::InvalidArgument`] if the bytes are not UTF-8.
    /// - Any fault error for a page the string touches.
    pub fn copy_in_str(
        &self,
        aspace: &mut AddressSpace,
        src: VirtualAddress,
        max: usize,
    ) -> Result<String, VmmError> {
        let mut bytes = Vec::new();
        let mut cursor = src;
        loop {
            let remaining = max - bytes.len();
            if remaining == 0 {
                return Err(VmmError::NameTooLong(max));
            }
            let frame = self.resolve(aspace, cursor)?;
            let offset = cursor.page_offset();
            let take = remaining.min((PAGE_SIZE - offset) as usize);

            let mut chunk = [0u8; PAGE_SIZE as usize];
            let chunk = &mut chunk[..take];
            self.coremap.read_phys(page_addr(frame, offset), chunk);
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                return String::from_utf8(bytes).map_err(|_| VmmError::InvalidArgument);
            }
            bytes.extend_from_slice(chunk);

            #[allow(clippy::cast_possible_truncation)]
            let step = take as u32;
            cursor = cursor
                .checked_add(step)
                .ok_or(VmmError::SegmentationFault(cursor))?;
        }
    }

    /// Walks `[start, start + len)` one page at a time, calling `f` with the
    /// physical address of each piece, the bytes already handled and the
    /// piece length.
    fn for_each_chunk(
        &self,
        aspace: &mut AddressSpace,
        start: VirtualAddress,
        len: usize,
        mut f: impl FnMut(PhysicalAddress, usize, usize),
    ) -> Result<(), VmmError> {
        let mut done = 0usize;
        let mut cursor = start;
        while done < len {
            let frame = self.resolve(aspace, cursor)?;
            let offset = cursor.page_offset();
            let n = (len - done).min((PAGE_SIZE - offset) as usize);
            f(page_addr(frame, offset), done, n);
            done += n;
            if done < len {
                #[allow(clippy::cast_possible_truncation)]
                let step = n as u32;
                cursor = cursor
                    .checked_add(step)
                    .ok_or(VmmError::SegmentationFault(cursor))?;
            }
        }
        Ok(())
    }
}

#[inline]
const fn page_addr(frame: PhysicalAddress, offset: u32) -> PhysicalAddress {
    PhysicalAddress::new(frame.as_u32() | offset)
}
