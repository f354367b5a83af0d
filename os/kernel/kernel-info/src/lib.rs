//! # Kernel Configuration and Boot Interface
//!
//! This crate defines the memory layout constants, system limits and the boot
//! hand-off record that govern the kernel's memory manager and process core.
//! It serves as the authoritative source for system-wide configuration so
//! that the frame allocator, the page tables, the fault handler and the
//! process table all agree on sizes and boundaries.
//!
//! ## Architecture
//!
//! The crate is organized into three modules:
//!
//! ### Boot Information ([`boot`])
//! The record handed to the memory manager at startup:
//! * **RAM size**: Total physical memory in bytes
//! * **First free address**: Everything below it belongs to the boot image
//!
//! ### Memory Layout ([`memory`])
//! The 32-bit user address space and paging geometry:
//! * **Pages**: 4 KiB pages, addressed through a two-level table
//! * **User Stack**: A fixed window directly below the user-space ceiling
//! * **Translation Cache**: Number of software-managed TLB slots
//!
//! ### Limits ([`limits`])
//! Table sizes for processes and descriptors, and bounds on user-supplied
//! paths and argument vectors.
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! User Address Space Layout (32-bit):
//!
//! 0x0000_0000          ┌─────────────────────────────────┐
//!                      │   Regions (text, data, bss)     │
//!                      ├─────────────────────────────────┤ highest region end
//!                      │        Guard Page               │
//!                      ├─────────────────────────────────┤ heap start
//!                      │   Heap (grows up via sbrk)      │
//!                      │                                 │
//! USER_STACK_BOTTOM    ├─────────────────────────────────┤ 0x7f44_8000
//!                      │   Stack (3000 pages, grows down)│
//! USERSTACK            ├─────────────────────────────────┤ 0x8000_0000
//!                      │        Kernel Space             │
//! 0xFFFF_FFFF          └─────────────────────────────────┘
//! ```
//!
//! Every virtual address splits into a directory index (bits 22..32), a
//! table index (bits 12..22) and a page offset (bits 0..12):
//!
//! ```rust
//! use kernel_info::memory::{DIRECTORY_SHIFT, PAGE_SHIFT, TABLE_ENTRIES};
//!
//! let va: u32 = 0x0040_3123;
//! assert_eq!(va >> DIRECTORY_SHIFT, 1);
//! assert_eq!((va >> PAGE_SHIFT) as usize % TABLE_ENTRIES, 3);
//! ```
//!
//! ## Configuration Management
//!
//! All layout constants are `const` values validated by compile-time
//! assertions; an inconsistent configuration fails the build rather than the
//! boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod limits;
pub mod memory;
