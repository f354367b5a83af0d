//! # Page Directory (outer level)
//!
//! - [`L2Index`]: index type for VA bits `[31:22]`.
//! - [`DirectoryEntry`]: points at the frame holding one [`PageTable`](super::pt::PageTable).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 entries; one per address space.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use bitfield_struct::bitfield;
use kernel_info::memory::{DIRECTORY_SHIFT, TABLE_ENTRIES};

/// Index into the Page Directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L2Index(u16);

/// A Page Directory entry.
#[bitfield(u32)]
pub struct DirectoryEntry {
    /// A page table has been allocated for this 4 MiB window.
    pub present: bool,
    #[bits(11)]
    __: u16,
    /// Frame number of the page table.
    #[bits(20)]
    pub table_frame: u32,
}

/// The Page Directory: 1024 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [DirectoryEntry; TABLE_ENTRIES],
}

impl L2Index {
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> DIRECTORY_SHIFT) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < TABLE_ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl DirectoryEntry {
    #[inline]
    #[must_use]
    pub const fn for_table(frame: PhysicalAddress) -> Self {
        Self::new()
            .with_present(true)
            .with_table_frame(frame.frame_number())
    }

    /// The page table's frame, if one has been allocated.
    #[inline]
    #[must_use]
    pub const fn table(self) -> Option<PhysicalAddress> {
        if self.present() {
            Some(PhysicalAddress::from_frame_number(self.table_frame()))
        } else {
            None
        }
    }
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: L2Index) -> DirectoryEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: L2Index, e: DirectoryEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Present entries with their indices.
    pub fn tables(&self) -> impl Iterator<Item = (L2Index, PhysicalAddress)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.table().map(|t| (L2Index::new(i as u16), t)))
    }
}
