//! # Process Lifecycle
//!
//! Processes, their PIDs and descriptor tables, and the system calls that
//! create and retire them: `fork`, `execv`, `waitpid`, `_exit`, `getpid`
//! and `sbrk`, plus `dup2` and `close`.
//!
//! ## Lifecycle
//!
//! ```text
//!   parent                                   child
//!   ──────                                   ─────
//!   fork() ──► PID, copy of address space,
//!              cwd and descriptors ────────► resumes with fork() == 0
//!                                              │
//!                                            execv() ─► new image, same PID
//!                                              │
//!   waitpid(pid) ◄── exit status ◄──────────── _exit(code)
//!   └─► reaped: PID, memory and
//!       descriptors released
//! ```
//!
//! A process that is never waited for stays in the PID table until
//! [`Kernel::shutdown`] reports it.
//!
//! ## Collaborators
//!
//! The file system ([`fs::Vfs`]), the thread system
//! ([`thread::ThreadSystem`]), the program loader ([`loader::ElfLoader`])
//! and the switch to user mode ([`thread::UserMode`]) are supplied by the
//! embedding kernel. With the `std` feature, [`host::HostThreads`] runs
//! kernel threads as OS threads.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]

extern crate alloc;

pub mod errno;
pub mod file_handle;
pub mod fs;
#[cfg(any(test, feature = "std"))]
pub mod host;
pub mod kernel;
pub mod loader;
pub mod logger;
pub mod pid_table;
pub mod proc;
pub mod syscall;
pub mod thread;
pub mod trapframe;
pub mod wait_status;

pub use errno::Errno;
pub use kernel::{Collaborators, Kernel};
pub use proc::{Pid, ProcState, Process};
pub use syscall::Sysno;
pub use trapframe::TrapFrame;
pub use wait_status::WaitStatus;
