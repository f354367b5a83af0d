//! # Translation Cache
//!
//! A model of a software-refilled TLB with [`NUM_TLB`] fully associative
//! slots. Each slot pairs an [`EntryHi`] (which virtual page) with an
//! [`EntryLo`] (which frame, and whether the mapping is usable).
//!
//! Slots are replaced round-robin. Every write happens under the cache's
//! spin lock with interrupts disabled, so a slot is never observed half
//! written by an interrupt handler on the same processor.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use bitfield_struct::bitfield;
use kernel_info::memory::{NUM_TLB, USERSPACE_TOP};
use kernel_sync::SpinMutex;
use log::trace;

/// Virtual half of a slot.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct EntryHi {
    #[bits(12)]
    __: u16,
    /// Virtual page number.
    #[bits(20)]
    pub vpn: u32,
}

/// Physical half of a slot.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct EntryLo {
    #[bits(8)]
    __: u8,
    pub global: bool,
    pub valid: bool,
    /// Writable. Set on every installed mapping.
    pub dirty: bool,
    pub nocache: bool,
    /// Physical frame number.
    #[bits(20)]
    pub pfn: u32,
}

impl EntryHi {
    /// A distinct kernel-space page per slot, so that invalid slots never
    /// match a user address nor each other.
    #[must_use]
    pub const fn invalid(slot: usize) -> Self {
        Self::new().with_vpn((USERSPACE_TOP >> 12) + slot as u32)
    }

    #[must_use]
    pub const fn for_page(va: VirtualAddress) -> Self {
        Self::new().with_vpn(va.page_number())
    }
}

impl EntryLo {
    #[must_use]
    pub const fn invalid() -> Self {
        Self::new()
    }

    #[must_use]
    pub const fn for_frame(frame: PhysicalAddress) -> Self {
        Self::new()
            .with_valid(true)
            .with_dirty(true)
            .with_pfn(frame.frame_number())
    }
}

struct TlbState {
    slots: [(EntryHi, EntryLo); NUM_TLB],
    next_victim: usize,
}

impl TlbState {
    fn find_slot(&self, hi: EntryHi) -> Option<usize> {
        self.slots.iter().position(|(h, _)| *h == hi)
    }

    fn write(&mut self, slot: usize, hi: EntryHi, lo: EntryLo) {
        self.slots[slot] = (hi, lo);
    }
}

pub struct TranslationCache {
    state: SpinMutex<TlbState>,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationCache {
    /// A cache with every slot invalid.
    #[must_use]
    pub fn new() -> Self {
        let mut slots = [(EntryHi::new(), EntryLo::invalid()); NUM_TLB];
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.0 = EntryHi::invalid(i);
        }
        Self {
            state: SpinMutex::new(TlbState {
                slots,
                next_victim: 0,
            }),
        }
    }

    /// Installs `va`'s page → `frame`. A slot already holding the page is
    /// overwritten; otherwise the next round-robin victim is replaced.
    /// Returns the slot written.
    pub fn install(&self, va: VirtualAddress, frame: PhysicalAddress) -> usize {
        let hi = EntryHi::for_page(va);
        let lo = EntryLo::for_frame(frame);

        let mut s = self.state.lock_irq();
        let slot = if let Some(slot) = s.find_slot(hi) {
            slot
        } else {
            let victim = s.next_victim;
            s.next_victim = (victim + 1) % NUM_TLB;
            victim
        };
        s.write(slot, hi, lo);
        drop(s);

        trace!("tlb[{slot}] {:?} -> {frame:?}", va.page_base());
        slot
    }

    /// Invalidates the slot holding `va`'s page, if any.
    pub fn evict(&self, va: VirtualAddress) -> bool {
        let hi = EntryHi::for_page(va);
        let mut s = self.state.lock_irq();
        match s.find_slot(hi) {
            Some(slot) => {
                s.write(slot, EntryHi::invalid(slot), EntryLo::invalid());
                true
            }
            None => false,
        }
    }

    /// Invalidates every slot.
    pub fn shootdown_all(&self) {
        let mut s = self.state.lock_irq();
        for slot in 0..NUM_TLB {
            s.write(slot, EntryHi::invalid(slot), EntryLo::invalid());
        }
    }

    /// What the hardware would translate `va` to, if it hit.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let s = self.state.lock_irq();
        let slot = s.find_slot(EntryHi::for_page(va))?;
        let lo = s.slots[slot].1;
        lo.valid()
            .then(|| PhysicalAddress::from_frame_number(lo.pfn()).checked_add(va.page_offset()))
            .flatten()
    }

    /// Number of slots holding a valid mapping.
    #[must_use]
    pub fn valid_entries(&self) -> usize {
        self.state
            .lock_irq()
            .slots
            .iter()
            .filter(|(_, lo)| lo.valid())
            .count()
    }
}
