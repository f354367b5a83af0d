//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! This crate provides the physical side of memory management and the
//! policy that sits on top of the page tables from `kernel-vmem`: which
//! frames are free, how a user fault is resolved, how the heap grows and
//! shrinks, and how the kernel reads and writes user memory.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Virtual Memory Manager (VMM)         │
//! │    • Fault resolution and TLB refill                │
//! │    • Heap break (sbrk)                              │
//! │    • Copies to and from user memory                 │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Coremap                                │
//! │    • One entry per 4 KiB frame                      │
//! │    • First-fit contiguous runs                      │
//! │    • Zero-filled frames, frame 0 never handed out   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Memory                        │
//! │    • Fixed-offset window onto RAM                   │
//! │    • Typed access for page-table frames             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Physical Memory ([`phys_mapper`])
//!
//! A page-aligned block standing in for RAM. Physical address `pa` is found
//! at a fixed offset from the block's base, the same way a direct-mapped
//! kernel segment reaches physical memory.
//!
//! ### Coremap ([`frame_alloc`])
//!
//! Hands out single frames to the fault handler and contiguous runs to the
//! kernel. Every allocation is zero-filled, which is what user programs rely
//! on for fresh heap and stack pages.
//!
//! ### Virtual Memory Manager ([`vmm`])
//!
//! Pages are materialized lazily. A fault at an address inside a region, the
//! heap, or the stack window instantiates the page-table entry (growing
//! downwards for the stack), backs it with a fresh frame and installs the
//! translation in the [`TranslationCache`](kernel_vmem::TranslationCache).
//! Anything else is a segmentation fault.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::frame_alloc::Coremap;
//! use kernel_alloc::phys_mapper::PhysicalMemory;
//! use kernel_info::boot::KernelBootInfo;
//! use kernel_vmem::{FrameAlloc, FrameKind};
//!
//! let boot = KernelBootInfo { ram_size: 32 * 4096, first_free: 8 * 4096 };
//! let coremap = Coremap::bootstrap(PhysicalMemory::new(boot.ram_size), &boot);
//! assert_eq!(coremap.total_frames(), 24);
//!
//! let frame = coremap.allocate_one(FrameKind::User).unwrap();
//! assert_eq!(coremap.used_bytes(), 4096);
//! coremap.free(frame);
//! assert_eq!(coremap.free_frames(), 24);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod frame_alloc;
pub mod phys_mapper;
pub mod vmm;

pub use frame_alloc::{Coremap, FrameState};
pub use phys_mapper::PhysicalMemory;
pub use vmm::{FaultKind, Vmm, VmmError};
