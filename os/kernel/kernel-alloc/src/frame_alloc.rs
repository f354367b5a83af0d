//! # Coremap Frame Allocator
//!
//! One entry per managed frame records whether the frame is free,
//! kernel-owned or backing a user page, and the first frame of every
//! allocation remembers how many frames the allocation spans. Freeing only
//! needs the base address.
//!
//! ```text
//!  frame:  0   1   2   3   4   5   6   7 ...
//!        [kernel image ][F ][K3][K ][K ][U1][F ]...
//!        ^ never managed     ^ run of 3  ^ single user frame
//! ```
//!
//! The table lives behind a [`SleepMutex`]. A separate atomic free counter
//! allows a lock-free "definitely not enough memory" check, which is
//! re-validated under the lock before anything is handed out.

use crate::phys_mapper::PhysicalMemory;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::PAGE_SIZE;
use kernel_sync::SleepMutex;
use kernel_vmem::{FrameAlloc, FrameKind, PhysMapper, PhysicalAddress};
use log::{debug, trace, warn};

/// What a managed frame currently holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameState {
    Free,
    /// Kernel allocation (page tables, kernel pages).
    Fixed,
    /// Backs a user page.
    InUse,
}

#[derive(Copy, Clone, Debug)]
struct CoremapEntry {
    state: FrameState,
    /// Length of the allocation starting here; zero on every other frame.
    run: usize,
}

impl CoremapEntry {
    const FREE: Self = Self {
        state: FrameState::Free,
        run: 0,
    };
}

/// Physical frame allocator over a [`PhysicalMemory`] block.
pub struct Coremap {
    memory: PhysicalMemory,
    /// Frame number of `entries[0]`.
    first_frame: u32,
    entries: SleepMutex<Vec<CoremapEntry>>,
    total: usize,
    free: AtomicUsize,
}

impl Coremap {
    /// Takes over every whole frame between `boot.first_free` and the end
    /// of RAM. Frame 0 is never managed, even if `first_free` is 0.
    ///
    /// # Panics
    /// If the boot information describes more RAM than `memory` provides.
    #[must_use]
    pub fn bootstrap(memory: PhysicalMemory, boot: &KernelBootInfo) -> Self {
        assert!(
            boot.ram_size <= memory.size(),
            "boot info claims {:#x} bytes of RAM, only {:#x} present",
            boot.ram_size,
            memory.size()
        );
        let first_frame = boot.first_free.div_ceil(PAGE_SIZE).max(1);
        let last_frame = boot.ram_size / PAGE_SIZE;
        let count = last_frame.saturating_sub(first_frame) as usize;

        let mut entries = Vec::with_capacity(count);
        entries.resize(count, CoremapEntry::FREE);
        debug!(
            "coremap: {count} frames from {} to {}",
            PhysicalAddress::from_frame_number(first_frame),
            PhysicalAddress::from_frame_number(last_frame)
        );

        Self {
            memory,
            first_frame,
            entries: SleepMutex::new(entries),
            total: count,
            free: AtomicUsize::new(count),
        }
    }

    /// Frames currently available.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    /// Frames managed in total.
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.total
    }

    /// Bytes currently allocated, kernel and user combined.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        (self.total - self.free_frames()) * PAGE_SIZE as usize
    }

    /// State of the frame containing `pa`, or `None` if it is not managed.
    #[must_use]
    pub fn state_of(&self, pa: PhysicalAddress) -> Option<FrameState> {
        let index = self.index_of(pa)?;
        Some(self.entries.lock()[index].state)
    }

    /// `npages` contiguous kernel frames.
    #[must_use]
    pub fn alloc_kpages(&self, npages: usize) -> Option<PhysicalAddress> {
        self.allocate_run(FrameKind::Kernel, npages)
    }

    /// Releases an allocation made with [`alloc_kpages`](Self::alloc_kpages).
    pub fn free_kpages(&self, base: PhysicalAddress) {
        self.free(base);
    }

    /// The RAM block this coremap manages.
    #[must_use]
    pub const fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    fn index_of(&self, pa: PhysicalAddress) -> Option<usize> {
        let index = pa.frame_number().checked_sub(self.first_frame)? as usize;
        (index < self.total).then_some(index)
    }

    fn frame_at(&self, index: usize) -> PhysicalAddress {
        #[allow(clippy::cast_possible_truncation)]
        PhysicalAddress::from_frame_number(self.first_frame + index as u32)
    }
}

fn first_fit(entries: &[CoremapEntry], count: usize) -> Option<usize> {
    let mut run_start = 0;
    let mut run_len = 0;
    for (i, e) in entries.iter().enumerate() {
        if e.state == FrameState::Free {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

impl FrameAlloc for Coremap {
    fn allocate_one(&self, kind: FrameKind) -> Option<PhysicalAddress> {
        self.allocate_run(kind, 1)
    }

    fn allocate_run(&self, kind: FrameKind, count: usize) -> Option<PhysicalAddress> {
        if count == 0 || self.free.load(Ordering::Acquire) < count {
            return None;
        }

        let mut entries = self.entries.lock();
        let start = first_fit(&entries, count)?;
        let state = match kind {
            FrameKind::Kernel => FrameState::Fixed,
            FrameKind::User => FrameState::InUse,
        };
        for e in &mut entries[start..start + count] {
            e.state = state;
            e.run = 0;
        }
        entries[start].run = count;
        self.free.fetch_sub(count, Ordering::AcqRel);

        let base = self.frame_at(start);
        for i in 0..count {
            self.memory.zero_frame(self.frame_at(start + i));
        }
        drop(entries);

        trace!("allocated {count} {kind:?} frame(s) at {base}");
        Some(base)
    }

    fn free(&self, base: PhysicalAddress) {
        if !base.is_page_aligned() {
            warn!("free of unaligned address {base} ignored");
            return;
        }
        let Some(start) = self.index_of(base) else {
            warn!("free of unmanaged frame {base} ignored");
            return;
        };

        let mut entries = self.entries.lock();
        let run = entries[start].run;
        if entries[start].state == FrameState::Free || run == 0 {
            warn!("free of {base}, which does not start an allocation, ignored");
            return;
        }
        for e in &mut entries[start..start + run] {
            *e = CoremapEntry::FREE;
        }
        self.free.fetch_add(run, Ordering::AcqRel);
        drop(entries);

        trace!("freed {run} frame(s) at {base}");
    }
}

// SAFETY: delegates to the owned RAM block.
unsafe impl PhysMapper for Coremap {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        self.memory.phys_to_ptr(pa)
    }
}
