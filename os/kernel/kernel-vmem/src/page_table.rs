//! # Two-Level Page Table
//!
//! [`PageTableTree`] owns a [`PageDirectory`] frame and every [`PageTable`]
//! frame reachable from it. All of them are ordinary kernel frames obtained
//! from a [`FrameAlloc`]; the tree is accessed through a [`PhysMapper`].

pub mod pd;
pub mod pt;

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::{FrameAlloc, FrameKind, PhysMapper, PhysMemory, VmError};
use kernel_info::memory::{DIRECTORY_SHIFT, PAGE_SHIFT, PAGE_SIZE};
use log::trace;

pub use pd::{DirectoryEntry, L2Index, PageDirectory};
pub use pt::{L1Index, PageTable, PageTableEntry};

/// Which way [`PageTableTree::ensure_entries`] walks from its start page.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Towards higher addresses (regions, heap).
    GrowUp,
    /// Towards lower addresses (the stack).
    GrowDown,
}

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L2Index, L1Index) {
    (va.directory_index(), va.table_index())
}

#[inline]
#[must_use]
pub const fn join_indices(dir: L2Index, table: L1Index) -> VirtualAddress {
    VirtualAddress::new(
        ((dir.as_usize() as u32) << DIRECTORY_SHIFT) | ((table.as_usize() as u32) << PAGE_SHIFT),
    )
}

/// A process's page tables.
///
/// Dropping the tree without [`destroy`](Self::destroy) leaks its frames.
#[derive(Debug)]
pub struct PageTableTree {
    root: PhysicalAddress,
}

impl PageTableTree {
    /// Allocates an empty directory.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if no frame is available.
    pub fn new<A: FrameAlloc>(alloc: &A) -> Result<Self, VmError> {
        let root = alloc
            .allocate_one(FrameKind::Kernel)
            .ok_or(VmError::OutOfMemory)?;
        Ok(Self { root })
    }

    /// Physical frame of the directory.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    #[inline]
    fn directory<'a, M: PhysMapper>(&'a self, mem: &M) -> &'a PageDirectory {
        // SAFETY: the root frame is owned by this tree and holds a directory.
        unsafe { mem.phys_to_mut(self.root) }
    }

    #[inline]
    fn directory_mut<'a, M: PhysMapper>(&'a mut self, mem: &M) -> &'a mut PageDirectory {
        // SAFETY: as above; `&mut self` makes the borrow exclusive.
        unsafe { mem.phys_to_mut(self.root) }
    }

    #[inline]
    fn table<'a, M: PhysMapper>(&'a self, mem: &M, frame: PhysicalAddress) -> &'a PageTable {
        // SAFETY: `frame` came out of this tree's directory.
        unsafe { mem.phys_to_mut(frame) }
    }

    #[inline]
    fn table_mut<'a, M: PhysMapper>(
        &'a mut self,
        mem: &M,
        frame: PhysicalAddress,
    ) -> &'a mut PageTable {
        // SAFETY: `frame` came out of this tree's directory; `&mut self` makes the borrow exclusive.
        unsafe { mem.phys_to_mut(frame) }
    }

    /// Looks up the entry for `va`. `None` means the page was never referenced.
    #[must_use]
    pub fn find_entry<M: PhysMapper>(&self, mem: &M, va: VirtualAddress) -> Option<PageTableEntry> {
        let (di, ti) = split_indices(va);
        let table = self.directory(mem).get(di).table()?;
        let e = self.table(mem, table).get(ti);
        e.present().then_some(e)
    }

    /// Mutable access to the entry for `va`, if it has been instantiated.
    pub fn find_entry_mut<'a, M: PhysMapper>(
        &'a mut self,
        mem: &M,
        va: VirtualAddress,
    ) -> Option<&'a mut PageTableEntry> {
        let (di, ti) = split_indices(va);
        let table = self.directory(mem).get(di).table()?;
        let e = self.table_mut(mem, table).get_mut(ti);
        if e.present() { Some(e) } else { None }
    }

    /// Instantiates entries (not frames) for `pages` consecutive pages
    /// starting at the page containing `va`, walking in `direction`.
    ///
    /// Entries that already exist are left untouched. The walk stops early
    /// at either end of the address space.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if a page table cannot be allocated. Tables
    /// allocated before the failure stay in the tree.
    pub fn ensure_entries<M: PhysMemory>(
        &mut self,
        mem: &M,
        va: VirtualAddress,
        pages: usize,
        direction: Direction,
    ) -> Result<(), VmError> {
        let mut page = Some(va.page_base());
        for _ in 0..pages {
            let Some(current) = page else { break };
            let (di, ti) = split_indices(current);

            let existing = self.directory(mem).get(di).table();
            let table = match existing {
                Some(table) => table,
                None => {
                    let frame = mem
                        .allocate_one(FrameKind::Kernel)
                        .ok_or(VmError::OutOfMemory)?;
                    self.directory_mut(mem)
                        .set(di, DirectoryEntry::for_table(frame));
                    trace!("page table for {:?} at {frame:?}", join_indices(di, L1Index::new(0)));
                    frame
                }
            };

            let entries = self.table_mut(mem, table);
            if !entries.get(ti).present() {
                entries.set(ti, PageTableEntry::placeholder());
            }

            page = match direction {
                Direction::GrowUp => current.checked_add(PAGE_SIZE),
                Direction::GrowDown => current.checked_sub(PAGE_SIZE),
            };
        }
        Ok(())
    }

    /// Drops the backing frame of `va`'s page, keeping the entry as a
    /// placeholder. Returns the freed frame.
    pub fn unmap<M: PhysMemory>(&mut self, mem: &M, va: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.find_entry_mut(mem, va)?;
        let frame = entry.frame()?;
        *entry = PageTableEntry::placeholder();
        mem.free(frame);
        Some(frame)
    }

    /// Calls `f` for every instantiated entry, in address order.
    pub fn for_each_entry<M: PhysMapper>(
        &self,
        mem: &M,
        mut f: impl FnMut(VirtualAddress, PageTableEntry),
    ) {
        for (di, table) in self.directory(mem).tables() {
            for (ti, e) in self.table(mem, table).entries() {
                f(join_indices(di, ti), e);
            }
        }
    }

    /// Number of pages currently backed by a frame.
    #[must_use]
    pub fn backed_pages<M: PhysMapper>(&self, mem: &M) -> usize {
        let mut n = 0;
        self.for_each_entry(mem, |_, e| {
            if e.frame().is_some() {
                n += 1;
            }
        });
        n
    }

    /// Deep copy: every backed page gets a fresh frame with the same
    /// contents, every placeholder stays a placeholder.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; everything allocated for the copy so far is
    /// released again.
    pub fn duplicate<M: PhysMemory>(&self, mem: &M) -> Result<Self, VmError> {
        let mut copy = Self::new(mem)?;
        if let Err(e) = self.copy_into(&mut copy, mem) {
            copy.destroy(mem);
            return Err(e);
        }
        Ok(copy)
    }

    fn copy_into<M: PhysMemory>(&self, dst: &mut Self, mem: &M) -> Result<(), VmError> {
        for (di, src_table) in self.directory(mem).tables() {
            let dst_table = mem
                .allocate_one(FrameKind::Kernel)
                .ok_or(VmError::OutOfMemory)?;
            dst.directory_mut(mem)
                .set(di, DirectoryEntry::for_table(dst_table));

            for (ti, e) in self.table(mem, src_table).entries() {
                let copied = match e.frame() {
                    Some(src_frame) => {
                        let frame = mem
                            .allocate_one(FrameKind::User)
                            .ok_or(VmError::OutOfMemory)?;
                        mem.copy_frame(frame, src_frame);
                        PageTableEntry::backed(frame)
                    }
                    None => PageTableEntry::placeholder(),
                };
                dst.table_mut(mem, dst_table).set(ti, copied);
            }
        }
        Ok(())
    }

    /// Frees every backing frame, every page table and the directory.
    pub fn destroy<M: PhysMemory>(self, mem: &M) {
        let mut frames = 0usize;
        for (_, table) in self.directory(mem).tables() {
            for (_, e) in self.table(mem, table).entries() {
                if let Some(frame) = e.frame() {
                    mem.free(frame);
                    frames += 1;
                }
            }
            mem.free(table);
        }
        mem.free(self.root);
        trace!("page tables at {:?} destroyed, {frames} frames released", self.root);
    }
}
