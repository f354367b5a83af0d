//! Hooks into the platform's notion of "the currently running execution
//! context".
//!
//! The kernel installs its implementation once during early boot with
//! [`install`]. Every lock in this crate asks [`context`] for the caller's
//! identity and interrupt state.

use crate::SyncOnceCell;
use core::fmt;
use core::num::NonZeroU64;

/// Identity of an execution context (a kernel thread, or a CPU running an
/// interrupt handler on its behalf).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ContextId(NonZeroU64);

impl ContextId {
    /// Returns `None` for zero, which is reserved for "nobody".
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

pub trait ExecutionContext: Sync {
    /// The context that is running right now.
    fn current(&self) -> ContextId;

    /// Whether the caller is executing an interrupt handler.
    fn in_interrupt(&self) -> bool;

    /// Whether interrupts are enabled on the local processor.
    fn interrupts_enabled(&self) -> bool;

    /// Enables or disables interrupts on the local processor.
    fn set_interrupts_enabled(&self, enabled: bool);

    /// Gives up the processor while waiting for a wakeup.
    fn relax(&self);
}

static CONTEXT: SyncOnceCell<&'static dyn ExecutionContext> = SyncOnceCell::new();

/// Installs the platform's execution-context hooks.
///
/// Returns `false` if hooks were already installed; the first installation
/// wins.
pub fn install(hooks: &'static dyn ExecutionContext) -> bool {
    CONTEXT.try_set(hooks).is_ok()
}

/// Returns the installed execution-context hooks.
///
/// # Panics
/// Without the `std` feature, panics if [`install`] has not been called.
#[must_use]
pub fn context() -> &'static dyn ExecutionContext {
    if let Some(hooks) = CONTEXT.get() {
        return *hooks;
    }

    #[cfg(any(test, feature = "std"))]
    {
        *CONTEXT.get_or_init(|| -> &'static dyn ExecutionContext { &crate::host::HostContext })
    }

    #[cfg(not(any(test, feature = "std")))]
    {
        panic!("execution context hooks not installed")
    }
}

/// Panics unless the caller is allowed to block.
pub(crate) fn assert_may_block(what: &str) {
    let hooks = context();
    assert!(
        !hooks.in_interrupt(),
        "{what}: blocking in interrupt context"
    );
    assert!(
        hooks.interrupts_enabled(),
        "{what}: blocking with interrupts disabled"
    );
}
