//! # Memory Layout

/// Size of a virtual page and of a physical frame.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the page-aligned part of an address.
pub const PAGE_FRAME: u32 = !(PAGE_SIZE - 1);

/// Number of slots in the outer directory and in every inner table.
pub const TABLE_ENTRIES: usize = 1024;

/// Shift extracting the directory index; one directory slot covers 4 MiB.
pub const DIRECTORY_SHIFT: u32 = 22;

/// First address that is no longer user space.
pub const USERSPACE_TOP: u32 = 0x8000_0000;

/// Initial user stack pointer; the stack grows down from here.
pub const USERSTACK: u32 = USERSPACE_TOP;

/// Size of the user stack window in pages.
pub const USER_STACK_PAGES: u32 = 3000;

/// Lowest address of the user stack window.
pub const USER_STACK_BOTTOM: u32 = USERSTACK - USER_STACK_PAGES * PAGE_SIZE;

/// Number of entries in the translation cache.
pub const NUM_TLB: usize = 64;

/// `sbrk` rejects shrink requests of this magnitude or larger (1 GiB).
pub const SBRK_MAX_SHRINK: i64 = 4096 * 1024 * 256;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(TABLE_ENTRIES == 1 << (DIRECTORY_SHIFT - PAGE_SHIFT));
    assert!(USERSTACK <= USERSPACE_TOP);
    assert!(USER_STACK_BOTTOM.is_multiple_of(PAGE_SIZE));
    assert!(NUM_TLB > 0);
};
