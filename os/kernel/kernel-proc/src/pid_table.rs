//! The process table, indexed by PID.

use crate::errno::Errno;
use crate::proc::{Pid, Process};
use alloc::sync::Arc;
use alloc::vec::Vec;
use kernel_info::limits::{PID_MAX, PID_MIN};
use kernel_sync::SleepMutex;

pub struct PidTable {
    slots: SleepMutex<Vec<Option<Arc<Process>>>>,
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PidTable {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(PID_MAX);
        slots.resize(PID_MAX, None);
        Self {
            slots: SleepMutex::new(slots),
        }
    }

    /// Enters `proc` in the lowest free slot and gives it that PID.
    ///
    /// # Errors
    /// [`Errno::EMPROC`] if the table is full.
    pub fn allocate(&self, proc: &Arc<Process>) -> Result<Pid, Errno> {
        let mut slots = self.slots.lock();
        let index = (PID_MIN..PID_MAX)
            .find(|&i| slots[i].is_none())
            .ok_or(Errno::EMPROC)?;
        slots[index] = Some(Arc::clone(proc));
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let pid = index as Pid;
        proc.set_pid(pid);
        Ok(pid)
    }

    #[must_use]
    pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        let index = Self::index(pid)?;
        self.slots.lock()[index].clone()
    }

    /// Frees `pid`'s slot.
    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        let index = Self::index(pid)?;
        self.slots.lock()[index].take()
    }

    /// Frees the slot `proc` occupies. Returns `false` if `proc` is not in
    /// the table.
    #[must_use]
    pub fn release(&self, proc: &Arc<Process>) -> bool {
        let Some(index) = Self::index(proc.pid()) else {
            return false;
        };
        let mut slots = self.slots.lock();
        if slots[index].as_ref().is_some_and(|p| Arc::ptr_eq(p, proc)) {
            slots[index] = None;
            true
        } else {
            false
        }
    }

    /// Every process currently in the table.
    #[must_use]
    pub fn live(&self) -> Vec<Arc<Process>> {
        self.slots.lock().iter().flatten().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(pid: Pid) -> Option<usize> {
        usize::try_from(pid).ok().filter(|&i| i < PID_MAX)
    }
}
