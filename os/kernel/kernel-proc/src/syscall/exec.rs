//! `execv` and the argument block a new program starts with.

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::proc::Process;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::convert::Infallible;
use kernel_alloc::{Vmm, VmmError};
use kernel_info::limits::{ARG_MAX, PATH_MAX};
use kernel_vmem::{AddressSpace, VirtualAddress};
use log::debug;

const WORD: usize = 4;

/// Bytes an argument string takes on the stack: the string, its NUL and
/// padding up to the next word.
const fn padded_len(arg: &str) -> usize {
    (arg.len() / WORD + 1) * WORD
}

/// Copies `args` below `top` and returns the address of the `argv` array,
/// which is also the initial stack pointer.
///
/// ```text
///   top ─►┌───────────────┐
///         │ args[0], NUL  │  padded to a word
///         │ args[1], NUL  │
///         │ ...           │
///         ├───────────────┤
///         │ NULL          │
///         │ argv[argc-1]  │
///         │ ...           │
///  argv ─►│ argv[0]       │
///         └───────────────┘
/// ```
///
/// # Errors
/// [`Errno::E2BIG`] if the block would exceed `ARG_MAX`, or the fault
/// error of a stack page that cannot be backed.
pub(crate) fn push_args(
    vmm: &Vmm<'_>,
    aspace: &mut AddressSpace,
    top: VirtualAddress,
    args: &[String],
) -> Result<VirtualAddress, Errno> {
    let strings: usize = args.iter().map(|a| padded_len(a)).sum();
    let total = strings + (args.len() + 1) * WORD;
    if total > ARG_MAX {
        return Err(Errno::E2BIG);
    }
    let too_big = |_| Errno::E2BIG;

    let mut cursor = top;
    let mut pointers = Vec::with_capacity(args.len());
    for arg in args {
        let len = padded_len(arg);
        cursor = cursor
            .checked_sub(u32::try_from(len).map_err(too_big)?)
            .ok_or(Errno::E2BIG)?;
        let mut bytes = Vec::with_capacity(len);
        bytes.extend_from_slice(arg.as_bytes());
        bytes.resize(len, 0);
        vmm.copy_out(aspace, cursor, &bytes)?;
        pointers.push(cursor);
    }

    let argv_bytes = u32::try_from((args.len() + 1) * WORD).map_err(too_big)?;
    let argv = cursor.checked_sub(argv_bytes).ok_or(Errno::E2BIG)?;
    let mut slot = argv;
    for ptr in pointers.into_iter().map(VirtualAddress::as_u32).chain([0]) {
        vmm.copy_out_word(aspace, slot, ptr)?;
        slot = slot.checked_add(4).ok_or(Errno::E2BIG)?;
    }
    Ok(argv)
}

impl Kernel {
    /// Replaces the current program with the one at `path`, passing it the
    /// NULL-terminated argument vector at `argv`. Returns only on failure,
    /// in which case the old program is left intact.
    ///
    /// # Errors
    /// - [`Errno::EFAULT`] for an unreadable path or argument vector.
    /// - [`Errno::EINVAL`] for an empty path.
    /// - [`Errno::ENAMETOOLONG`] if the path exceeds `PATH_MAX`.
    /// - [`Errno::E2BIG`] if the arguments exceed `ARG_MAX`.
    /// - Anything [`load_program`](Kernel::load_program) reports.
    pub fn sys_execv(
        self: &Arc<Self>,
        path: VirtualAddress,
        argv: VirtualAddress,
    ) -> Result<Infallible, Errno> {
        let proc = self.current_process();
        let (path, args) = self.copy_in_exec(&proc, path, argv)?;
        let entry = self.load_program(&proc, &path, &args)?;
        debug!("{}: execv {path} {args:?}", proc.pid());
        self.user.enter_new(self, entry)
    }

    fn copy_in_exec(
        &self,
        proc: &Process,
        path: VirtualAddress,
        argv: VirtualAddress,
    ) -> Result<(String, Vec<String>), Errno> {
        if argv.as_u32() == 0 {
            return Err(Errno::EFAULT);
        }
        let vmm = self.vmm();
        proc.with_aspace(|aspace| {
            let aspace = aspace.ok_or(Errno::EFAULT)?;
            let path = vmm.copy_in_str(aspace, path, PATH_MAX)?;
            if path.is_empty() {
                return Err(Errno::EINVAL);
            }

            let mut args = Vec::new();
            let mut used = WORD;
            let mut slot = argv;
            loop {
                let ptr = vmm.copy_in_word(aspace, slot)?;
                if ptr == 0 {
                    break;
                }
                let budget = ARG_MAX.saturating_sub(used + WORD);
                let arg = vmm
                    .copy_in_str(aspace, VirtualAddress::new(ptr), budget)
                    .map_err(|e| match e {
                        VmmError::NameTooLong(_) => Errno::E2BIG,
                        e => e.into(),
                    })?;
                used += padded_len(&arg) + WORD;
                args.push(arg);
                slot = slot.checked_add(4).ok_or(Errno::EFAULT)?;
            }
            Ok((path, args))
        })
    }
}
