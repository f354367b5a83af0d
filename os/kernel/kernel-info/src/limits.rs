//! # System Limits

/// Number of slots in the process table. Slot 0 is never handed out, so
/// user processes receive PIDs in `1..PID_MAX`.
pub const PID_MAX: usize = 128;

/// Lowest PID given to a user process.
pub const PID_MIN: usize = 1;

/// Number of descriptors per process.
pub const OPEN_MAX: usize = 64;

/// Descriptors below this are reserved for standard input, output and error.
pub const FIRST_USER_FD: usize = 3;

/// Maximum length of a path, including the terminator.
pub const PATH_MAX: usize = 1024;

/// Maximum combined size of an argument vector, including terminators.
pub const ARG_MAX: usize = 64 * 1024;

const _: () = {
    assert!(PID_MIN < PID_MAX);
    assert!(FIRST_USER_FD < OPEN_MAX);
};
