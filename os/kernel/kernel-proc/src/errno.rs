//! Error numbers returned to user space.

use kernel_alloc::VmmError;

/// An error number as seen by user programs.
///
/// The discriminants are the values placed in `v0` when a system call fails.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[repr(i32)]
pub enum Errno {
    #[error("function not implemented")]
    ENOSYS = 1,
    #[error("out of memory")]
    ENOMEM = 3,
    #[error("bad memory reference")]
    EFAULT = 6,
    #[error("string too long")]
    ENAMETOOLONG = 7,
    #[error("invalid argument")]
    EINVAL = 8,
    #[error("too many processes for user")]
    EMPROC = 11,
    #[error("too many processes in system")]
    ENPROC = 12,
    #[error("file is not executable")]
    ENOEXEC = 13,
    #[error("argument list too long")]
    E2BIG = 14,
    #[error("no such process")]
    ESRCH = 15,
    #[error("no child processes")]
    ECHILD = 16,
    #[error("no such file or directory")]
    ENOENT = 19,
    #[error("too many open files")]
    EMFILE = 28,
    #[error("bad file number")]
    EBADF = 30,
}

impl Errno {
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl From<VmmError> for Errno {
    fn from(value: VmmError) -> Self {
        match value {
            VmmError::NoAddressSpace | VmmError::SegmentationFault(_) => Self::EFAULT,
            VmmError::OutOfMemory => Self::ENOMEM,
            VmmError::InvalidArgument => Self::EINVAL,
            VmmError::NameTooLong(_) => Self::ENAMETOOLONG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::VirtualAddress;

    #[test]
    fn codes_match_the_user_abi() {
        assert_eq!(Errno::ENOMEM.code(), 3);
        assert_eq!(Errno::EMPROC.code(), 11);
        assert_eq!(Errno::ESRCH.code(), 15);
        assert_eq!(Errno::ECHILD.code(), 16);
        assert_eq!(Errno::EBADF.code(), 30);
    }

    #[test]
    fn vm_errors_become_errnos() {
        assert_eq!(
            Errno::from(VmmError::SegmentationFault(VirtualAddress::new(0))),
            Errno::EFAULT
        );
        assert_eq!(Errno::from(VmmError::NameTooLong(8)), Errno::ENAMETOOLONG);
        assert_eq!(Errno::from(VmmError::OutOfMemory), Errno::ENOMEM);
    }
}
