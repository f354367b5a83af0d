//! # Open Files
//!
//! A [`FileHandle`] is one `open` of a vnode: access mode plus the current
//! offset. Descriptors refer to handles through `Arc`, so a handle inherited
//! by `fork` or copied by `dup2` is shared, offset included, and the vnode is
//! closed when the last descriptor referring to it goes away.

use crate::errno::Errno;
use crate::fs::{OpenFlags, Vnode};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use kernel_info::limits::{FIRST_USER_FD, OPEN_MAX};
use kernel_sync::SleepMutex;
use log::trace;

pub struct FileHandle {
    name: String,
    vnode: Arc<dyn Vnode>,
    flags: OpenFlags,
    offset: SleepMutex<u64>,
}

impl FileHandle {
    #[must_use]
    pub fn new(name: impl Into<String>, vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            vnode,
            flags,
            offset: SleepMutex::new(0),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn flags(&self) -> OpenFlags {
        self.flags
    }

    #[must_use]
    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        *self.offset.lock()
    }

    /// Reads at the current offset and advances it.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if the handle was opened write-only.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if !self.flags.can_read() {
            return Err(Errno::EBADF);
        }
        let mut offset = self.offset.lock();
        let n = self.vnode.read_at(*offset, buf)?;
        *offset += n as u64;
        Ok(n)
    }

    /// Writes at the current offset (or the end, for append handles) and
    /// advances it.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if the handle was opened read-only.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        if !self.flags.can_write() {
            return Err(Errno::EBADF);
        }
        let mut offset = self.offset.lock();
        if self.flags.append() {
            *offset = self.vnode.stat().size;
        }
        let n = self.vnode.write_at(*offset, buf)?;
        *offset += n as u64;
        Ok(n)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        trace!("closing {}", self.name);
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// A process's descriptor slots.
#[derive(Debug)]
pub struct DescriptorTable {
    slots: Vec<Option<Arc<FileHandle>>>,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorTable {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(OPEN_MAX);
        slots.resize(OPEN_MAX, None);
        Self { slots }
    }

    /// Puts `handle` at `fd`, returning whatever was there.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if `fd` is out of range.
    pub fn install(
        &mut self,
        fd: usize,
        handle: Arc<FileHandle>,
    ) -> Result<Option<Arc<FileHandle>>, Errno> {
        let slot = self.slots.get_mut(fd).ok_or(Errno::EBADF)?;
        Ok(slot.replace(handle))
    }

    /// Puts `handle` in the lowest free slot above the standard descriptors.
    ///
    /// # Errors
    /// [`Errno::EMFILE`] if every slot is taken.
    pub fn assign(&mut self, handle: Arc<FileHandle>) -> Result<usize, Errno> {
        let fd = (FIRST_USER_FD..OPEN_MAX)
            .find(|&fd| self.slots[fd].is_none())
            .ok_or(Errno::EMFILE)?;
        self.slots[fd] = Some(handle);
        Ok(fd)
    }

    /// # Errors
    /// [`Errno::EBADF`] if `fd` is out of range or not open.
    pub fn get(&self, fd: usize) -> Result<Arc<FileHandle>, Errno> {
        self.slots
            .get(fd)
            .and_then(Option::clone)
            .ok_or(Errno::EBADF)
    }

    /// Closes `fd`.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if `fd` is out of range or not open.
    pub fn release(&mut self, fd: usize) -> Result<(), Errno> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .map(drop)
            .ok_or(Errno::EBADF)
    }

    /// Makes `new` refer to the same handle as `old`, closing whatever `new`
    /// referred to before.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if either descriptor is out of range or `old` is not open.
    pub fn dup2(&mut self, old: usize, new: usize) -> Result<usize, Errno> {
        let handle = self.get(old)?;
        if new >= OPEN_MAX {
            return Err(Errno::EBADF);
        }
        if old != new {
            self.slots[new] = Some(handle);
        }
        Ok(new)
    }

    /// A table referring to the same handles, as a forked child gets.
    #[must_use]
    pub fn inherit(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }

    /// Closes every descriptor and returns how many were open.
    pub fn release_all(&mut self) -> usize {
        self.slots.iter_mut().filter_map(Option::take).count()
    }

    /// Number of open descriptors.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Stat;
    use kernel_sync::SpinMutex;

    #[derive(Default)]
    struct Buffer(SpinMutex<Vec<u8>>);

    impl Vnode for Buffer {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
            let data = self.0.lock();
            let start = (offset as usize).min(data.len());
            let n = buf.len().min(data.len() - start);
            buf[..n].copy_from_slice(&data[start..start + n]);
            Ok(n)
        }

        fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
            let mut data = self.0.lock();
            let end = offset as usize + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(buf);
            Ok(buf.len())
        }

        fn stat(&self) -> Stat {
            Stat {
                size: self.0.lock().len() as u64,
            }
        }

        fn is_seekable(&self) -> bool {
            true
        }
    }

    fn handle(flags: OpenFlags) -> Arc<FileHandle> {
        FileHandle::new("buf", Arc::new(Buffer::default()), flags)
    }

    #[test]
    fn assign_skips_standard_descriptors_and_fills_up() {
        let mut table = DescriptorTable::new();
        let h = handle(OpenFlags::read_only());
        assert_eq!(table.assign(Arc::clone(&h)), Ok(3));
        assert_eq!(table.assign(Arc::clone(&h)), Ok(4));
        table.release(3).unwrap();
        assert_eq!(table.assign(Arc::clone(&h)), Ok(3));

        while table.assign(Arc::clone(&h)).is_ok() {}
        assert_eq!(table.assign(Arc::clone(&h)), Err(Errno::EMFILE));
        assert_eq!(table.open_count(), OPEN_MAX - FIRST_USER_FD);
        assert_eq!(Arc::strong_count(&h), 1 + OPEN_MAX - FIRST_USER_FD);

        assert_eq!(table.release_all(), OPEN_MAX - FIRST_USER_FD);
        assert_eq!(Arc::strong_count(&h), 1);
    }

    #[test]
    fn bad_descriptors_are_rejected() {
        let mut table = DescriptorTable::new();
        assert_eq!(table.get(0).unwrap_err(), Errno::EBADF);
        assert_eq!(table.get(OPEN_MAX).unwrap_err(), Errno::EBADF);
        assert_eq!(table.release(5), Err(Errno::EBADF));
        assert_eq!(
            table.install(OPEN_MAX, handle(OpenFlags::read_only())).unwrap_err(),
            Errno::EBADF
        );
        assert_eq!(table.dup2(1, 2), Err(Errno::EBADF));
    }

    #[test]
    fn dup2_shares_the_handle_and_its_offset() {
        let mut table = DescriptorTable::new();
        let h = handle(OpenFlags::read_write());
        table.install(1, Arc::clone(&h)).unwrap();
        assert_eq!(table.dup2(1, 1), Ok(1));
        assert_eq!(table.dup2(1, 9), Ok(9));
        assert_eq!(table.dup2(1, OPEN_MAX), Err(Errno::EBADF));

        table.get(1).unwrap().write(b"hello").unwrap();
        assert_eq!(table.get(9).unwrap().offset(), 5);
        assert_eq!(Arc::strong_count(&h), 3);
    }

    #[test]
    fn inherit_shares_handles() {
        let mut parent = DescriptorTable::new();
        let h = handle(OpenFlags::read_only());
        parent.install(0, Arc::clone(&h)).unwrap();
        let mut child = parent.inherit();
        assert_eq!(Arc::strong_count(&h), 3);
        assert_eq!(child.release_all(), 1);
        assert_eq!(Arc::strong_count(&h), 2);
        assert!(parent.get(0).is_ok());
    }

    #[test]
    fn access_mode_is_enforced() {
        let ro = handle(OpenFlags::read_only());
        assert_eq!(ro.write(b"x"), Err(Errno::EBADF));
        let wo = handle(OpenFlags::write_only());
        assert_eq!(wo.read(&mut [0; 4]), Err(Errno::EBADF));
    }

    #[test]
    fn append_writes_go_to_the_end() {
        let vnode: Arc<dyn Vnode> = Arc::new(Buffer::default());
        let plain = FileHandle::new("a", Arc::clone(&vnode), OpenFlags::write_only());
        plain.write(b"abc").unwrap();
        let appender = FileHandle::new(
            "b",
            Arc::clone(&vnode),
            OpenFlags::write_only().with_append(true),
        );
        appender.write(b"de").unwrap();
        assert_eq!(appender.offset(), 5);
        assert_eq!(vnode.stat().size, 5);

        let reader = FileHandle::new("c", vnode, OpenFlags::read_only());
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf), Ok(5));
        assert_eq!(&buf[..5], b"abcde");
    }
}
