//! # Page Table (inner level)
//!
//! - [`L1Index`]: index type for VA bits `[21:12]`.
//! - [`PageTableEntry`]: maps one 4 KiB page.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 PTEs.
//!
//! ## Entry states
//!
//! | present | valid | meaning |
//! |:-------:|:-----:|:--------|
//! | 0 | - | never referenced |
//! | 1 | 0 | referenced, no frame yet (placeholder) |
//! | 1 | 1 | backed by `frame_number` |

use crate::addresses::{PhysicalAddress, VirtualAddress};
use bitfield_struct::bitfield;
use kernel_info::memory::{PAGE_SHIFT, TABLE_ENTRIES};

/// Index into the Page Table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L1Index(u16);

/// A single Page Table entry (PTE).
#[doc(alias = "PTE")]
#[bitfield(u32)]
pub struct PageTableEntry {
    /// The entry has been instantiated.
    pub present: bool,
    /// A frame backs the page.
    pub valid: bool,
    #[bits(10)]
    __: u16,
    #[bits(20)]
    pub frame_number: u32,
}

/// The Page Table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; TABLE_ENTRIES],
}

impl L1Index {
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> PAGE_SHIFT) & 0x3FF) as u16)
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

impl PageTableEntry {
    /// An instantiated entry without a frame.
    #[inline]
    #[must_use]
    pub const fn placeholder() -> Self {
        Self::new().with_present(true)
    }

    /// An entry backed by `frame`.
    #[inline]
    #[must_use]
    pub const fn backed(frame: PhysicalAddress) -> Self {
        debug_assert!(frame.is_page_aligned() && frame.as_u32() != 0);
        Self::placeholder()
            .with_valid(true)
            .with_frame_number(frame.frame_number())
    }

    /// The backing frame. A zero base counts as unbacked even when `valid` is set.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<PhysicalAddress> {
        if self.valid() && self.frame_number() != 0 {
            Some(PhysicalAddress::from_frame_number(self.frame_number()))
        } else {
            None
        }
    }
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: L1Index) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn get_mut(&mut self, i: L1Index) -> &mut PageTableEntry {
        &mut self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: L1Index, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Present entries with their indices.
    pub fn entries(&self) -> impl Iterator<Item = (L1Index, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.present())
            .map(|(i, e)| (L1Index::new(i as u16), *e))
    }
}
