//! Execution-context hooks for running the kernel on top of a hosted OS.
//!
//! Each OS thread is one execution context. Interrupt state is tracked per
//! thread and only changes through [`IrqGuard`](crate::IrqGuard) or
//! [`HostContext::simulate_interrupt`].

use crate::context::{ContextId, ExecutionContext};
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct HostContext;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
    static IN_INTERRUPT: Cell<bool> = const { Cell::new(false) };
}

impl HostContext {
    /// Runs `f` as if it were an interrupt handler on the calling thread.
    pub fn simulate_interrupt<R>(f: impl FnOnce() -> R) -> R {
        struct Restore(bool);
        impl Drop for Restore {
            fn drop(&mut self) {
                IN_INTERRUPT.set(self.0);
            }
        }

        let _restore = Restore(IN_INTERRUPT.replace(true));
        f()
    }
}

impl ExecutionContext for HostContext {
    fn current(&self) -> ContextId {
        let raw = ID.with(|id| *id);
        ContextId::from_raw(raw).unwrap_or_else(|| unreachable!("thread ids start at 1"))
    }

    fn in_interrupt(&self) -> bool {
        IN_INTERRUPT.get()
    }

    fn interrupts_enabled(&self) -> bool {
        INTERRUPTS_ENABLED.get()
    }

    fn set_interrupts_enabled(&self, enabled: bool) {
        INTERRUPTS_ENABLED.set(enabled);
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}
