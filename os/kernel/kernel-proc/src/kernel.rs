//! # Kernel
//!
//! The [`Kernel`] owns physical memory, the translation cache and the PID
//! table, and knows the collaborators that live outside this crate: the
//! file system, the thread system, the program loader and the return to
//! user mode.
//!
//! ```text
//!            ┌────────────── Kernel ───────────────┐
//!  syscalls ─► PidTable   Coremap   TranslationCache│
//!            │    │          ▲             ▲        │
//!            │    ▼          └──── Vmm ────┘        │
//!            │ Process ─► AddressSpace, files, cwd  │
//!            └───┬─────────┬──────────┬─────────┬───┘
//!               Vfs   ThreadSystem  ElfLoader  UserMode
//! ```

use crate::errno::Errno;
use crate::file_handle::FileHandle;
use crate::fs::{OpenFlags, Vfs, Vnode};
use crate::loader::ElfLoader;
use crate::pid_table::PidTable;
use crate::proc::{Pid, ProcState, Process};
use crate::syscall::exec::push_args;
use crate::thread::{ThreadEntry, ThreadSystem, UserEntry, UserMode};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_alloc::{Coremap, PhysicalMemory, Vmm};
use kernel_info::boot::KernelBootInfo;
use kernel_vmem::{AddressSpace, TranslationCache};
use log::{debug, info, trace, warn};

/// Device path the standard descriptors of a new program are opened on.
pub const CONSOLE: &str = "con:";

/// The pieces of the system this crate drives but does not implement.
pub struct Collaborators {
    pub vfs: Arc<dyn Vfs>,
    pub threads: Arc<dyn ThreadSystem>,
    pub loader: Arc<dyn ElfLoader>,
    pub user: Arc<dyn UserMode>,
}

pub struct Kernel {
    coremap: Coremap,
    tlb: TranslationCache,
    pub(crate) pids: PidTable,
    kproc: Arc<Process>,
    pub(crate) vfs: Arc<dyn Vfs>,
    pub(crate) threads: Arc<dyn ThreadSystem>,
    loader: Arc<dyn ElfLoader>,
    pub(crate) user: Arc<dyn UserMode>,
    shut_down: AtomicBool,
}

impl Kernel {
    /// Takes over `memory` and creates the kernel process.
    ///
    /// The kernel process has PID 0, starts in the boot directory and is
    /// not entered in the PID table.
    #[must_use]
    pub fn bootstrap(
        memory: PhysicalMemory,
        boot: &KernelBootInfo,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let coremap = Coremap::bootstrap(memory, boot);
        let kproc = Arc::new(Process::new("[kernel]", None));
        kproc.set_cwd(collaborators.vfs.boot_directory());
        kproc.add_thread();

        info!(
            "kernel up: {} KiB RAM, {} frames free",
            boot.ram_size / 1024,
            coremap.free_frames()
        );
        Arc::new(Self {
            coremap,
            tlb: TranslationCache::new(),
            pids: PidTable::new(),
            kproc,
            vfs: collaborators.vfs,
            threads: collaborators.threads,
            loader: collaborators.loader,
            user: collaborators.user,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Ends the kernel's life. Processes still in the PID table are never
    /// torn down; each is logged and their number returned.
    ///
    /// # Panics
    /// On a second call.
    #[must_use = "orphans are leaked"]
    pub fn shutdown(&self) -> usize {
        assert!(
            !self.shut_down.swap(true, Ordering::AcqRel),
            "kernel shut down twice"
        );
        let orphans = self.pids.live();
        for proc in &orphans {
            warn!(
                "pid {} ({}) was never reaped, state {:?}",
                proc.pid(),
                proc.name(),
                proc.state()
            );
        }
        drop(self.kproc.set_cwd(None));
        info!(
            "shutdown: {} orphans, {} bytes of RAM in use",
            orphans.len(),
            self.coremap.used_bytes()
        );
        orphans.len()
    }

    #[must_use]
    pub const fn vmm(&self) -> Vmm<'_> {
        Vmm::new(&self.coremap, &self.tlb)
    }

    #[must_use]
    pub const fn coremap(&self) -> &Coremap {
        &self.coremap
    }

    #[must_use]
    pub const fn tlb(&self) -> &TranslationCache {
        &self.tlb
    }

    #[must_use]
    pub const fn kernel_process(&self) -> &Arc<Process> {
        &self.kproc
    }

    #[must_use]
    pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        self.pids.lookup(pid)
    }

    /// Live processes in the PID table.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.pids.len()
    }

    /// The caller's process; kernel threads belong to the kernel process.
    #[must_use]
    pub fn current_process(&self) -> Arc<Process> {
        self.threads
            .current_process()
            .unwrap_or_else(|| Arc::clone(&self.kproc))
    }

    fn is_current(&self, proc: &Arc<Process>) -> bool {
        Arc::ptr_eq(&self.current_process(), proc)
    }

    /// A child of the current process with the console on descriptors 0,
    /// 1 and 2 and a PID. It has no address space and no thread yet.
    ///
    /// # Errors
    /// Whatever opening the console reports, or [`Errno::EMPROC`] if no PID
    /// is free. Nothing is left behind on failure.
    pub fn create_runprogram(&self, name: &str) -> Result<Arc<Process>, Errno> {
        let parent = self.current_process();
        let proc = Arc::new(Process::new(name, Some(&parent)));
        proc.set_cwd(parent.cwd());

        let ready = self
            .open_console(&proc)
            .and_then(|()| self.pids.allocate(&proc));
        match ready {
            Ok(pid) => {
                debug!("created {name} as pid {pid}");
                Ok(proc)
            }
            Err(e) => {
                self.release_resources(&proc);
                Err(e)
            }
        }
    }

    fn open_console(&self, proc: &Process) -> Result<(), Errno> {
        let standard = [
            ("stdin", OpenFlags::read_only()),
            ("stdout", OpenFlags::write_only()),
            ("stderr", OpenFlags::write_only()),
        ];
        let mut files = proc.files();
        for (fd, (name, flags)) in standard.into_iter().enumerate() {
            let vnode = self.vfs.open(CONSOLE, flags)?;
            files.install(fd, FileHandle::new(name, vnode, flags))?;
        }
        Ok(())
    }

    /// Replaces `proc`'s address space with a fresh one holding the program
    /// at `path`, its stack and `args`.
    ///
    /// On failure `proc` keeps the address space it had.
    ///
    /// # Errors
    /// - Whatever the file system reports for `path`.
    /// - [`Errno::ENOMEM`] when memory runs out.
    /// - [`Errno::E2BIG`] if `args` do not fit the argument limit.
    /// - Whatever the loader reports.
    pub fn load_program(
        &self,
        proc: &Arc<Process>,
        path: &str,
        args: &[String],
    ) -> Result<UserEntry, Errno> {
        let image = self.vfs.open(path, OpenFlags::read_only())?;
        let mut aspace = AddressSpace::create(&self.coremap).map_err(|_| Errno::ENOMEM)?;

        let entry = match self.build_image(&*image, &mut aspace, args) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("loading {path} failed: {e}");
                aspace.destroy(&self.coremap);
                return Err(e);
            }
        };

        let old = proc.set_aspace(Some(aspace));
        if self.is_current(proc) {
            self.vmm().deactivate();
        }
        if let Some(old) = old {
            old.destroy(&self.coremap);
        }
        debug!(
            "{} loaded {path}: entry {}, {} args at {}",
            proc.pid(),
            entry.entry,
            entry.argc,
            entry.argv
        );
        Ok(entry)
    }

    fn build_image(
        &self,
        image: &dyn Vnode,
        aspace: &mut AddressSpace,
        args: &[String],
    ) -> Result<UserEntry, Errno> {
        let vmm = self.vmm();
        let entry = self.loader.load(image, aspace, &vmm)?;
        let top = aspace.define_stack();
        let argv = push_args(&vmm, aspace, top, args)?;
        Ok(UserEntry {
            entry,
            stack: argv,
            argc: args.len(),
            argv,
        })
    }

    /// Starts the program at `path` in a new child of the current process.
    ///
    /// # Errors
    /// As for [`create_runprogram`](Self::create_runprogram) and
    /// [`load_program`](Self::load_program), or [`Errno::ENOMEM`] if the
    /// thread cannot be created.
    pub fn run_program(self: &Arc<Self>, path: &str, args: &[String]) -> Result<Arc<Process>, Errno> {
        let proc = self.create_runprogram(path)?;
        let started = self.load_program(&proc, path, args).and_then(|entry| {
            self.spawn_thread(path, &proc, move |kernel| {
                kernel.user.enter_new(kernel, entry);
            })
        });
        if let Err(e) = started {
            self.destroy_process(&proc);
            return Err(e);
        }
        Ok(proc)
    }

    /// Starts a thread in `proc` that activates its address space and runs
    /// `body`. A body that returns ends the thread.
    pub(crate) fn spawn_thread<F>(
        self: &Arc<Self>,
        name: &str,
        proc: &Arc<Process>,
        body: F,
    ) -> Result<(), Errno>
    where
        F: FnOnce(&Arc<Self>) + Send + 'static,
    {
        let kernel = Arc::clone(self);
        let owner = Arc::clone(proc);
        proc.add_thread();
        let entry: ThreadEntry = Box::new(move || {
            owner.with_aspace(|aspace| kernel.vmm().activate(aspace.as_deref()));
            body(&kernel);
            owner.remove_thread();
        });
        self.threads
            .spawn(name, Arc::clone(proc), entry)
            .inspect_err(|e| {
                warn!("{name}: thread creation failed: {e}");
                proc.remove_thread();
            })
    }

    /// Tears down a process that has no threads and will never be waited
    /// for: its PID, working directory, address space and descriptors.
    ///
    /// # Panics
    /// For the kernel process, or a process that still has threads.
    pub fn destroy_process(&self, proc: &Arc<Process>) {
        assert!(
            !Arc::ptr_eq(proc, &self.kproc),
            "the kernel process cannot be destroyed"
        );
        assert_eq!(
            proc.thread_count(),
            0,
            "{} destroyed with live threads",
            proc.name()
        );
        let current = self.is_current(proc);
        self.reap(proc);
        if current {
            self.vmm().deactivate();
        }
    }

    /// Drops `proc` from the PID table and frees everything it holds.
    pub(crate) fn reap(&self, proc: &Arc<Process>) {
        let listed = self.pids.release(proc);
        self.release_resources(proc);
        proc.set_state(ProcState::Reaped);
        trace!("reaped {} ({}), listed: {listed}", proc.pid(), proc.name());
    }

    fn release_resources(&self, proc: &Process) {
        drop(proc.set_cwd(None));
        if let Some(aspace) = proc.set_aspace(None) {
            aspace.destroy(&self.coremap);
        }
        let closed = proc.files().release_all();
        trace!("{}: closed {closed} descriptors", proc.name());
    }

    /// Retires the calling thread without recording an exit status.
    pub fn thread_exit(&self) -> ! {
        self.current_process().remove_thread();
        self.threads.exit_current()
    }
}
