//! Descriptor calls: `open`, `read`, `write`, `close` and `dup2`.
//!
//! Data moves between the file layer and user memory through a kernel
//! bounce buffer of at most one page, so a large transfer never pins more
//! than that.

use crate::errno::Errno;
use crate::file_handle::FileHandle;
use crate::fs::OpenFlags;
use crate::kernel::Kernel;
use alloc::sync::Arc;
use alloc::vec;
use kernel_info::limits::PATH_MAX;
use kernel_info::memory::PAGE_SIZE;
use kernel_vmem::VirtualAddress;
use log::debug;

/// Access-mode bits of the raw `open` flags.
const ACCESS_MASK: u32 = 0b11;

impl Kernel {
    /// Opens the file named by the string at `path` and returns the lowest
    /// free descriptor above the standard ones.
    ///
    /// # Errors
    /// - [`Errno::EINVAL`] for an unknown access mode.
    /// - [`Errno::EFAULT`] or [`Errno::ENAMETOOLONG`] if the path cannot be read.
    /// - Whatever the file system reports.
    /// - [`Errno::EMFILE`] if the descriptor table is full.
    pub fn sys_open(&self, path: VirtualAddress, flags: u32) -> Result<usize, Errno> {
        if flags & ACCESS_MASK == ACCESS_MASK {
            return Err(Errno::EINVAL);
        }
        let flags = OpenFlags::from_bits(flags);
        let proc = self.current_process();
        let name = proc.with_aspace(|aspace| {
            let aspace = aspace.ok_or(Errno::EFAULT)?;
            self.vmm()
                .copy_in_str(aspace, path, PATH_MAX)
                .map_err(Errno::from)
        })?;

        let vnode = self.vfs.open(&name, flags)?;
        let fd = proc.files().assign(FileHandle::new(name.as_str(), vnode, flags))?;
        debug!("{}: opened {name} as {fd}", proc.pid());
        Ok(fd)
    }

    /// Reads up to `len` bytes from `fd` into user memory at `buf`.
    ///
    /// # Errors
    /// - [`Errno::EBADF`] if `fd` is not open for reading.
    /// - [`Errno::EFAULT`] if `buf` is not writable user memory.
    pub fn sys_read(&self, fd: i32, buf: VirtualAddress, len: usize) -> Result<usize, Errno> {
        let handle = self.handle(fd)?;
        if !handle.flags().can_read() {
            return Err(Errno::EBADF);
        }
        let proc = self.current_process();
        let mut bounce = vec![0; len.min(PAGE_SIZE as usize)];
        let mut done = 0;
        while done < len {
            let want = (len - done).min(bounce.len());
            let n = handle.read(&mut bounce[..want])?;
            let dst = user_offset(buf, done)?;
            proc.with_aspace(|aspace| {
                let aspace = aspace.ok_or(Errno::EFAULT)?;
                self.vmm()
                    .copy_out(aspace, dst, &bounce[..n])
                    .map_err(|_| Errno::EFAULT)
            })?;
            done += n;
            if n < want {
                break;
            }
        }
        Ok(done)
    }

    /// Writes `len` bytes of user memory at `buf` to `fd`.
    ///
    /// # Errors
    /// - [`Errno::EBADF`] if `fd` is not open for writing.
    /// - [`Errno::EFAULT`] if `buf` is not readable user memory.
    pub fn sys_write(&self, fd: i32, buf: VirtualAddress, len: usize) -> Result<usize, Errno> {
        let handle = self.handle(fd)?;
        if !handle.flags().can_write() {
            return Err(Errno::EBADF);
        }
        let proc = self.current_process();
        let mut bounce = vec![0; len.min(PAGE_SIZE as usize)];
        let mut done = 0;
        while done < len {
            let chunk = (len - done).min(bounce.len());
            let src = user_offset(buf, done)?;
            proc.with_aspace(|aspace| {
                let aspace = aspace.ok_or(Errno::EFAULT)?;
                self.vmm()
                    .copy_in(aspace, src, &mut bounce[..chunk])
                    .map_err(|_| Errno::EFAULT)
            })?;
            let n = handle.write(&bounce[..chunk])?;
            done += n;
            if n < chunk {
                break;
            }
        }
        Ok(done)
    }

    /// Closes descriptor `fd` of the current process.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if `fd` is not open.
    pub fn sys_close(&self, fd: i32) -> Result<(), Errno> {
        let fd = usize::try_from(fd).map_err(|_| Errno::EBADF)?;
        self.current_process().files().release(fd)
    }

    /// Makes `new` refer to the same open file as `old`.
    ///
    /// # Errors
    /// [`Errno::EBADF`] if `old` is not open or either number is out of range.
    pub fn sys_dup2(&self, old: i32, new: i32) -> Result<usize, Errno> {
        let old = usize::try_from(old).map_err(|_| Errno::EBADF)?;
        let new = usize::try_from(new).map_err(|_| Errno::EBADF)?;
        self.current_process().files().dup2(old, new)
    }

    fn handle(&self, fd: i32) -> Result<Arc<FileHandle>, Errno> {
        let fd = usize::try_from(fd).map_err(|_| Errno::EBADF)?;
        self.current_process().files().get(fd)
    }
}

fn user_offset(base: VirtualAddress, offset: usize) -> Result<VirtualAddress, Errno> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or(Errno::EFAULT)
}
