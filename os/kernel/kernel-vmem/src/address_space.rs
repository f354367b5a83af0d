//! # Address Space
//!
//! The complete virtual memory state of one user process:
//!
//! - the **regions** defined while loading the program image,
//! - the **heap**, placed one guard page above the highest region and moved
//!   by `sbrk`,
//! - the **stack window**, a fixed range of pages directly below
//!   [`USERSTACK`], and
//! - the [`PageTableTree`] mapping touched pages to frames.
//!
//! Pages are backed on demand. Defining a region or the stack allocates
//! nothing; the fault handler allocates frames as pages are touched.
//!
//! ## Ownership
//!
//! An address space owns its frames, but it does not own the allocator they
//! came from, so it cannot free them on drop. Every address space must end in
//! [`AddressSpace::destroy`]; dropping one leaks its frames.

use crate::addresses::VirtualAddress;
use crate::page_table::{Direction, PageTableTree};
use crate::{FrameAlloc, PhysMemory, VmError};
use alloc::vec::Vec;
use bitfield_struct::bitfield;
use kernel_info::memory::{PAGE_SIZE, USER_STACK_BOTTOM, USERSPACE_TOP, USERSTACK};
use log::{debug, trace};

/// Access rights requested for a region. Recorded, not enforced.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct RegionPermissions {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    #[bits(5)]
    __: u8,
}

impl RegionPermissions {
    #[must_use]
    pub const fn from_flags(readable: bool, writable: bool, executable: bool) -> Self {
        Self::new()
            .with_readable(readable)
            .with_writable(writable)
            .with_executable(executable)
    }
}

/// A page-aligned virtual range defined by the program image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Region {
    start: VirtualAddress,
    end: VirtualAddress,
    permissions: RegionPermissions,
}

impl Region {
    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    /// One past the last byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn npages(&self) -> usize {
        ((self.end.as_u32() - self.start.as_u32()) / PAGE_SIZE) as usize
    }

    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> RegionPermissions {
        self.permissions
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.start <= va && va < self.end
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// The break-adjustable heap. `start` is fixed once the image is loaded;
/// `end` is the current break and need not be page aligned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Heap {
    start: VirtualAddress,
    end: VirtualAddress,
}

impl Heap {
    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.start <= va && va < self.end
    }
}

/// Which part of the address space an address belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Region,
    Heap,
    Stack,
}

impl Segment {
    /// The direction in which page-table structure is grown for this segment.
    #[must_use]
    pub const fn growth(self) -> Direction {
        match self {
            Self::Region | Self::Heap => Direction::GrowUp,
            Self::Stack => Direction::GrowDown,
        }
    }
}

#[derive(Debug)]
pub struct AddressSpace {
    regions: Vec<Region>,
    heap: Option<Heap>,
    stack_top: VirtualAddress,
    stack_bottom: VirtualAddress,
    table: PageTableTree,
}

impl AddressSpace {
    /// An empty address space: no regions, no heap, an empty directory.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if the directory frame cannot be allocated.
    pub fn create<A: FrameAlloc>(alloc: &A) -> Result<Self, VmError> {
        let table = PageTableTree::new(alloc)?;
        Ok(Self {
            regions: Vec::new(),
            heap: None,
            stack_top: VirtualAddress::new(USERSTACK),
            stack_bottom: VirtualAddress::new(USER_STACK_BOTTOM),
            table,
        })
    }

    /// Defines the region covering `[va, va + size)`, widened to whole pages,
    /// and moves the heap above it if it is now the highest region.
    ///
    /// # Errors
    /// - [`VmError::InvalidRange`] if the range wraps or reaches into the stack window.
    /// - [`VmError::Overlap`] if it overlaps an existing region.
    pub fn define_region(
        &mut self,
        va: VirtualAddress,
        size: u32,
        permissions: RegionPermissions,
    ) -> Result<(), VmError> {
        let start = va.page_base();
        let end = va
            .checked_add(size)
            .and_then(VirtualAddress::page_round_up)
            .ok_or(VmError::InvalidRange)?;
        if end > self.stack_bottom {
            return Err(VmError::InvalidRange);
        }

        let region = Region {
            start,
            end,
            permissions,
        };
        if self.regions.iter().any(|r| r.overlaps(&region)) {
            return Err(VmError::Overlap);
        }
        let heap_start = end
            .checked_add(PAGE_SIZE)
            .filter(|s| *s < self.stack_bottom)
            .ok_or(VmError::InvalidRange)?;

        self.regions.push(region);
        if self.heap.is_none_or(|h| heap_start > h.start) {
            self.heap = Some(Heap {
                start: heap_start,
                end: heap_start,
            });
        }

        debug!(
            "region {start}..{end} ({} pages, {permissions:?}), heap at {heap_start}",
            region.npages()
        );
        Ok(())
    }

    /// Instantiates page-table entries for every page of every region so the
    /// loader can write into them.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if a page table cannot be allocated.
    pub fn prepare_load<M: PhysMemory>(&mut self, mem: &M) -> Result<(), VmError> {
        for region in &self.regions {
            self.table
                .ensure_entries(mem, region.start, region.npages(), Direction::GrowUp)?;
        }
        Ok(())
    }

    /// Called once the image is loaded. Re-runs the region walk, which is a
    /// no-op for regions that were defined before [`prepare_load`](Self::prepare_load).
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if a page table cannot be allocated.
    pub fn complete_load<M: PhysMemory>(&mut self, mem: &M) -> Result<(), VmError> {
        self.prepare_load(mem)
    }

    /// Places the stack window below [`USERSTACK`] and returns the initial
    /// stack pointer.
    pub fn define_stack(&mut self) -> VirtualAddress {
        self.stack_top = VirtualAddress::new(USERSTACK);
        self.stack_bottom = VirtualAddress::new(USER_STACK_BOTTOM);
        self.stack_top
    }

    /// Deep copy with fresh frames for every backed page.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; the partial copy has been released.
    pub fn copy<M: PhysMemory>(&self, mem: &M) -> Result<Self, VmError> {
        let table = self.table.duplicate(mem)?;
        trace!(
            "address space copied: {} regions, {} backed pages",
            self.regions.len(),
            table.backed_pages(mem)
        );
        Ok(Self {
            regions: self.regions.clone(),
            heap: self.heap,
            stack_top: self.stack_top,
            stack_bottom: self.stack_bottom,
            table,
        })
    }

    /// Releases every frame and page table.
    pub fn destroy<M: PhysMemory>(self, mem: &M) {
        self.table.destroy(mem);
    }

    /// Which segment `va` falls into, checking regions, then the heap, then
    /// the stack window.
    #[must_use]
    pub fn classify(&self, va: VirtualAddress) -> Option<Segment> {
        if va.as_u32() >= USERSPACE_TOP {
            return None;
        }
        if self.regions.iter().any(|r| r.contains(va)) {
            return Some(Segment::Region);
        }
        if self.heap.is_some_and(|h| h.contains(va)) {
            return Some(Segment::Heap);
        }
        if self.stack_bottom <= va && va < self.stack_top {
            return Some(Segment::Stack);
        }
        None
    }

    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    #[must_use]
    pub const fn heap(&self) -> Option<Heap> {
        self.heap
    }

    /// Moves the break. The caller is responsible for unmapping pages above
    /// a lowered break.
    ///
    /// # Panics
    /// If there is no heap, or `end` lies below the heap start or inside the
    /// stack window.
    pub fn set_break(&mut self, end: VirtualAddress) {
        let stack_bottom = self.stack_bottom;
        let heap = self.heap.as_mut().unwrap_or_else(|| panic!("no heap"));
        assert!(
            heap.start <= end && end < stack_bottom,
            "break {end} outside {}..{stack_bottom}",
            heap.start
        );
        heap.end = end;
    }

    #[inline]
    #[must_use]
    pub const fn stack_top(&self) -> VirtualAddress {
        self.stack_top
    }

    #[inline]
    #[must_use]
    pub const fn stack_bottom(&self) -> VirtualAddress {
        self.stack_bottom
    }

    #[inline]
    #[must_use]
    pub const fn page_table(&self) -> &PageTableTree {
        &self.table
    }

    #[inline]
    pub const fn page_table_mut(&mut self) -> &mut PageTableTree {
        &mut self.table
    }
}
