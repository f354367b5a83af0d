//! # System Calls
//!
//! The trap handler hands a [`TrapFrame`] to [`Kernel::syscall`], which
//! decodes the call number from `v0` and the arguments from `a0`..`a3`,
//! runs the call and writes the result back:
//!
//! | outcome | `v0`        | `a3` |
//! |---------|-------------|------|
//! | success | return value | 0   |
//! | failure | errno        | 1   |
//!
//! The program counter is then moved past the `syscall` instruction.
//! `_exit` and a successful `execv` never return to the dispatcher.

pub(crate) mod exec;
mod file;
mod fork;
mod memory;
mod wait;

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::proc::Pid;
use crate::trapframe::TrapFrame;
use alloc::sync::Arc;
use kernel_vmem::VirtualAddress;
use log::trace;

/// Call numbers of the supported system calls.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum Sysno {
    Fork = 0,
    Execv = 2,
    Exit = 3,
    Waitpid = 4,
    Getpid = 5,
    Sbrk = 7,
    Open = 45,
    Dup2 = 48,
    Close = 49,
    Read = 50,
    Write = 55,
}

impl TryFrom<u32> for Sysno {
    type Error = Errno;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Fork,
            2 => Self::Execv,
            3 => Self::Exit,
            4 => Self::Waitpid,
            5 => Self::Getpid,
            7 => Self::Sbrk,
            45 => Self::Open,
            48 => Self::Dup2,
            49 => Self::Close,
            50 => Self::Read,
            55 => Self::Write,
            _ => return Err(Errno::ENOSYS),
        })
    }
}

#[allow(clippy::cast_sign_loss)]
const fn pid_word(pid: Pid) -> u32 {
    pid as u32
}

impl Kernel {
    /// Runs the system call described by `tf` and stores its result.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn syscall(self: &Arc<Self>, tf: &mut TrapFrame) {
        let number = tf.syscall_number();
        let [a0, a1, a2, _] = tf.args();
        let frame = *tf;

        let result = Sysno::try_from(number).and_then(|call| {
            trace!("syscall {call:?}({a0:#x}, {a1:#x}, {a2:#x})");
            match call {
                Sysno::Fork => self.sys_fork(&frame).map(pid_word),
                Sysno::Execv => self
                    .sys_execv(VirtualAddress::new(a0), VirtualAddress::new(a1))
                    .map(|never| match never {}),
                Sysno::Exit => self.sys_exit(a0 as i32),
                Sysno::Waitpid => {
                    let status = (a1 != 0).then(|| VirtualAddress::new(a1));
                    self.sys_waitpid(a0 as i32, status, a2 as i32).map(pid_word)
                }
                Sysno::Getpid => Ok(pid_word(self.sys_getpid())),
                Sysno::Sbrk => self.sys_sbrk(a0 as i32).map(VirtualAddress::as_u32),
                Sysno::Open => self.sys_open(VirtualAddress::new(a0), a1).map(|fd| fd as u32),
                Sysno::Read => self
                    .sys_read(a0 as i32, VirtualAddress::new(a1), a2 as usize)
                    .map(|n| n as u32),
                Sysno::Write => self
                    .sys_write(a0 as i32, VirtualAddress::new(a1), a2 as usize)
                    .map(|n| n as u32),
                Sysno::Dup2 => self
                    .sys_dup2(a0 as i32, a1 as i32)
                    .map(|fd| fd as u32),
                Sysno::Close => self.sys_close(a0 as i32).map(|()| 0),
            }
        });

        if let Err(e) = result {
            trace!("syscall {number} failed: {e}");
        }
        tf.set_result(result);
        tf.advance();
    }

    #[must_use]
    pub fn sys_getpid(&self) -> Pid {
        self.current_process().pid()
    }
}
