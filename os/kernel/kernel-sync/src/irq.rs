use crate::context::context;
use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// A mutex guard that also disables interrupts while held.
///
/// `IrqMutex` combines an interrupt guard with a regular [`MutexGuard`].
/// When created via [`Mutex::lock_irq`], it:
///
/// 1. saves the current interrupt state and disables interrupts, and
/// 2. acquires the underlying mutex,
///
/// releasing them in reverse order on drop.
///
/// This keeps the holder from being preempted in the middle of an update
/// that must appear atomic to the rest of the processor, such as rewriting
/// a translation-cache slot.
///
/// # Examples
///
/// ```
/// use kernel_sync::{SpinMutex, irq::interrupts_enabled};
///
/// let slot = SpinMutex::new(0_u32);
/// {
///     let mut g = slot.lock_irq();
///     *g = 7;
///     assert!(!interrupts_enabled());
/// }
/// assert!(interrupts_enabled());
/// ```
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock> {
    // Field order matters: the mutex is released before interrupts return.
    g: MutexGuard<'a, T, R>,
    _irq: IrqGuard,
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with interrupts disabled for the guard's lifetime.
    ///
    /// This constructs an [`IrqGuard`] to save/disable interrupts, then
    /// acquires the mutex and returns a paired [`IrqMutex`] guard. Dropping
    /// the guard releases the mutex and restores interrupts if they were
    /// previously enabled.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let ig = IrqGuard::new();
        let g = self.lock();
        IrqMutex { g, _irq: ig }
    }
}

impl<T, R: RawLock + RawUnlock> Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.g
    }
}

impl<T, R: RawLock + RawUnlock> DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.g
    }
}

/// Whether interrupts are enabled on the local processor.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    context().interrupts_enabled()
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// On drop, interrupts are re-enabled **only** if they were enabled when the
/// guard was created, so guards nest.
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let hooks = context();
        let enabled = hooks.interrupts_enabled();
        if enabled {
            hooks.set_interrupts_enabled(false);
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            context().set_interrupts_enabled(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest() {
        assert!(interrupts_enabled());
        let outer = IrqGuard::new();
        {
            let _inner = IrqGuard::new();
            assert!(!interrupts_enabled());
        }
        assert!(!interrupts_enabled());
        drop(outer);
        assert!(interrupts_enabled());
    }
}
