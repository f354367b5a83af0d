//! Encoding of the status word `waitpid` hands back.
//!
//! ```text
//! | 31 ‒ 2  | 1 ‒ 0 |
//! | payload |  tag  |   tag 0: exited, payload = exit code
//!                       tag 1: killed, payload = signal number
//! ```

/// Segmentation violation.
pub const SIGSEGV: i32 = 11;

const TAG_MASK: i32 = 0b11;
const TAG_EXITED: i32 = 0;
const TAG_SIGNALED: i32 = 1;

/// How a process ended.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct WaitStatus(i32);

impl WaitStatus {
    /// Normal termination with `code`.
    #[must_use]
    pub const fn exited(code: i32) -> Self {
        Self(code << 2 | TAG_EXITED)
    }

    /// Termination by `signal`.
    #[must_use]
    pub const fn signaled(signal: i32) -> Self {
        Self(signal << 2 | TAG_SIGNALED)
    }

    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The word stored to user memory.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn is_exited(self) -> bool {
        self.0 & TAG_MASK == TAG_EXITED
    }

    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        if self.is_exited() {
            Some(self.0 >> 2)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn is_signaled(self) -> bool {
        self.0 & TAG_MASK == TAG_SIGNALED
    }

    #[must_use]
    pub const fn signal(self) -> Option<i32> {
        if self.is_signaled() {
            Some(self.0 >> 2)
        } else {
            None
        }
    }
}

impl core::fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(code) = self.exit_code() {
            write!(f, "exited({code})")
        } else if let Some(sig) = self.signal() {
            write!(f, "signaled({sig})")
        } else {
            write!(f, "WaitStatus({:#x})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_shifted_past_the_tag() {
        let s = WaitStatus::exited(42);
        assert_eq!(s.raw(), 168);
        assert!(s.is_exited());
        assert_eq!(s.exit_code(), Some(42));
        assert_eq!(s.signal(), None);
    }

    #[test]
    fn signals_carry_tag_one() {
        let s = WaitStatus::signaled(SIGSEGV);
        assert_eq!(s.raw(), 45);
        assert!(s.is_signaled());
        assert_eq!(s.signal(), Some(SIGSEGV));
        assert_eq!(s.exit_code(), None);
        assert_eq!(format!("{s:?}"), "signaled(11)");
    }

    #[test]
    fn negative_codes_survive() {
        assert_eq!(WaitStatus::exited(-1).exit_code(), Some(-1));
        assert_eq!(WaitStatus::from_raw(WaitStatus::exited(7).raw()), WaitStatus::exited(7));
    }
}
