//! # Trap Frame
//!
//! The register image saved on kernel entry. System calls follow the MIPS
//! convention: the call number arrives in `v0`, arguments in `a0`‒`a3`, and
//! the result goes back in `v0` with `a3` as the error flag.

use crate::errno::Errno;

/// Saved user registers, in the order the trap entry code stores them.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TrapFrame {
    /// Faulting address (`c0_vaddr`).
    pub vaddr: u32,
    pub status: u32,
    pub cause: u32,
    pub lo: u32,
    pub hi: u32,
    pub ra: u32,
    pub at: u32,
    pub v0: u32,
    pub v1: u32,
    pub a0: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub t: [u32; 8],
    pub s: [u32; 8],
    pub t8: u32,
    pub t9: u32,
    pub gp: u32,
    pub sp: u32,
    pub s8: u32,
    /// Address of the trapping instruction.
    pub epc: u32,
}

impl TrapFrame {
    /// Size of one instruction.
    pub const INSTRUCTION_SIZE: u32 = 4;

    #[inline]
    #[must_use]
    pub const fn syscall_number(&self) -> u32 {
        self.v0
    }

    #[inline]
    #[must_use]
    pub const fn args(&self) -> [u32; 4] {
        [self.a0, self.a1, self.a2, self.a3]
    }

    /// Stores a system call result.
    #[allow(clippy::cast_sign_loss)]
    pub const fn set_result(&mut self, result: Result<u32, Errno>) {
        match result {
            Ok(value) => {
                self.v0 = value;
                self.a3 = 0;
            }
            Err(e) => {
                self.v0 = e.code() as u32;
                self.a3 = 1;
            }
        }
    }

    /// Moves past the `syscall` instruction so it is not re-executed.
    pub const fn advance(&mut self) {
        self.epc = self.epc.wrapping_add(Self::INSTRUCTION_SIZE);
    }

    /// The frame a forked child resumes from: `fork` returned 0 without error.
    #[must_use]
    pub const fn forked_child(&self) -> Self {
        let mut tf = *self;
        tf.v0 = 0;
        tf.a3 = 0;
        tf.advance();
        tf
    }
}
