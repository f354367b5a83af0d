//! Interfaces to the file layer.
//!
//! Processes reach file-like objects through descriptors: the console for
//! standard I/O, files opened with `open`, program images for `exec` and the
//! working directory. The file system itself lives behind [`Vfs`] and
//! [`Vnode`].

use crate::errno::Errno;
use alloc::sync::Arc;
use bitfield_struct::bitfield;

/// Access mode bits of [`OpenFlags`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum AccessMode {
    ReadOnly = 0,
    WriteOnly = 1,
    ReadWrite = 2,
}

impl AccessMode {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::ReadOnly,
            1 => Self::WriteOnly,
            _ => Self::ReadWrite,
        }
    }
}

/// `open` flags as passed by user programs.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct OpenFlags {
    #[bits(2)]
    pub access: AccessMode,
    pub create: bool,
    pub exclusive: bool,
    pub truncate: bool,
    pub append: bool,
    #[bits(26)]
    __: u32,
}

impl OpenFlags {
    #[must_use]
    pub const fn read_only() -> Self {
        Self::new().with_access(AccessMode::ReadOnly)
    }

    #[must_use]
    pub const fn write_only() -> Self {
        Self::new().with_access(AccessMode::WriteOnly)
    }

    #[must_use]
    pub const fn read_write() -> Self {
        Self::new().with_access(AccessMode::ReadWrite)
    }

    #[must_use]
    pub const fn can_read(self) -> bool {
        !matches!(self.access(), AccessMode::WriteOnly)
    }

    #[must_use]
    pub const fn can_write(self) -> bool {
        !matches!(self.access(), AccessMode::ReadOnly)
    }
}

/// File metadata.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Stat {
    pub size: u64,
}

/// An open file-like object.
pub trait Vnode: Send + Sync {
    /// Reads at `offset`, returning the number of bytes read (0 at the end).
    ///
    /// # Errors
    /// Whatever the underlying object reports.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno>;

    /// Writes at `offset`, returning the number of bytes written.
    ///
    /// # Errors
    /// Whatever the underlying object reports.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno>;

    fn stat(&self) -> Stat;

    /// Whether offsets mean anything (false for devices such as the console).
    fn is_seekable(&self) -> bool;
}

/// Name lookup.
pub trait Vfs: Send + Sync {
    /// Opens `path`.
    ///
    /// # Errors
    /// [`Errno::ENOENT`] if nothing has that name, or whatever else the
    /// file system reports.
    fn open(&self, path: &str, flags: OpenFlags) -> Result<Arc<dyn Vnode>, Errno>;

    /// The directory the kernel process starts in, if any.
    fn boot_directory(&self) -> Option<Arc<dyn Vnode>>;
}
