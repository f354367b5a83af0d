//! A small world for driving the process core from tests: an in-memory file
//! system, a loader that maps raw images, OS threads, and "user programs"
//! written as Rust closures.
//!
//! A program image is the program's name followed by a NUL. The loader maps
//! it at [`TEXT`] and gives every program one data page at [`DATA`];
//! entering user mode reads the name back at the entry point and runs the
//! closure registered under it. Whatever the closure returns becomes the
//! exit code.

#![allow(dead_code)]

use kernel_alloc::{PhysicalMemory, Vmm, VmmError};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::PAGE_SIZE;
use kernel_proc::fs::{OpenFlags, Stat, Vfs, Vnode};
use kernel_proc::host::HostThreads;
use kernel_proc::kernel::CONSOLE;
use kernel_proc::loader::ElfLoader;
use kernel_proc::thread::{UserEntry, UserMode};
use kernel_proc::{Collaborators, Errno, Kernel, Pid, Process, Sysno, TrapFrame};
use kernel_vmem::{AddressSpace, RegionPermissions, VirtualAddress};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const TEXT: u32 = 0x0040_0000;
pub const DATA: u32 = 0x1000_0000;
/// First heap address of every loaded program.
pub const HEAP: u32 = DATA + 2 * PAGE_SIZE;

const RX: RegionPermissions = RegionPermissions::from_flags(true, false, true);
const RW: RegionPermissions = RegionPermissions::from_flags(true, true, false);

pub fn va(addr: u32) -> VirtualAddress {
    VirtualAddress::new(addr)
}

#[derive(Default)]
pub struct MemFile {
    data: Mutex<Vec<u8>>,
}

impl MemFile {
    pub fn with(bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(bytes.to_vec()),
        })
    }
}

impl Vnode for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
        let data = self.data.lock().unwrap();
        let start = usize::try_from(offset).unwrap().min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        let mut data = self.data.lock().unwrap();
        let start = usize::try_from(offset).unwrap();
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> Stat {
        Stat {
            size: self.data.lock().unwrap().len() as u64,
        }
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Collects everything written to the console.
#[derive(Default)]
pub struct ConsoleNode {
    pub output: Mutex<Vec<u8>>,
}

impl Vnode for ConsoleNode {
    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize, Errno> {
        Ok(0)
    }

    fn write_at(&self, _offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> Stat {
        Stat::default()
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct MemFs {
    files: Mutex<HashMap<String, Arc<MemFile>>>,
    pub console: Arc<ConsoleNode>,
    pub root: Arc<MemFile>,
    pub console_broken: AtomicBool,
}

impl MemFs {
    /// Installs a program image for the closure registered as `name`.
    pub fn install_program(&self, path: &str, name: &str) {
        let mut image = name.as_bytes().to_vec();
        image.push(0);
        self.install(path, &image);
    }

    pub fn install(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), MemFile::with(bytes));
    }
}

impl Vfs for MemFs {
    fn open(&self, path: &str, _flags: OpenFlags) -> Result<Arc<dyn Vnode>, Errno> {
        if path == CONSOLE {
            if self.console_broken.load(Ordering::SeqCst) {
                return Err(Errno::ENOENT);
            }
            return Ok(self.console.clone());
        }
        let file = self.files.lock().unwrap().get(path).cloned();
        file.map(|f| f as Arc<dyn Vnode>).ok_or(Errno::ENOENT)
    }

    fn boot_directory(&self) -> Option<Arc<dyn Vnode>> {
        Some(self.root.clone())
    }
}

/// Maps the raw image read-execute at [`TEXT`] plus one data page.
pub struct FixedLoader;

fn vm(e: kernel_vmem::VmError) -> Errno {
    Errno::from(VmmError::from(e))
}

impl ElfLoader for FixedLoader {
    fn load(
        &self,
        image: &dyn Vnode,
        aspace: &mut AddressSpace,
        vmm: &Vmm<'_>,
    ) -> Result<VirtualAddress, Errno> {
        let mut bytes = vec![0; usize::try_from(image.stat().size).unwrap()];
        image.read_at(0, &mut bytes)?;
        if bytes.is_empty() {
            return Err(Errno::ENOEXEC);
        }
        let size = u32::try_from(bytes.len()).map_err(|_| Errno::ENOEXEC)?;

        aspace.define_region(va(TEXT), size, RX).map_err(vm)?;
        aspace.define_region(va(DATA), PAGE_SIZE, RW).map_err(vm)?;
        aspace.prepare_load(vmm.coremap()).map_err(vm)?;
        vmm.copy_out(aspace, va(TEXT), &bytes)?;
        aspace.complete_load(vmm.coremap()).map_err(vm)?;
        Ok(va(TEXT))
    }
}

pub type Program = Arc<dyn Fn(&Arc<Kernel>, UserEntry) -> i32 + Send + Sync>;
pub type ForkBody = Box<dyn FnOnce(&Arc<Kernel>) -> i32 + Send>;

/// Runs registered closures in place of user code.
#[derive(Default)]
pub struct ScriptedUser {
    programs: Mutex<HashMap<String, Program>>,
    forks: Mutex<HashMap<u32, ForkBody>>,
}

static NEXT_FORK_SITE: AtomicU32 = AtomicU32::new(TEXT);

impl UserMode for ScriptedUser {
    fn enter_forked(&self, kernel: &Arc<Kernel>, tf: TrapFrame) -> ! {
        assert_eq!((tf.v0, tf.a3), (0, 0), "fork must return 0 in the child");
        let site = tf.epc - TrapFrame::INSTRUCTION_SIZE;
        let body = self
            .forks
            .lock()
            .unwrap()
            .remove(&site)
            .expect("no body registered for this fork site");
        let code = body(kernel);
        kernel.sys_exit(code)
    }

    fn enter_new(&self, kernel: &Arc<Kernel>, entry: UserEntry) -> ! {
        let name = kernel
            .current_process()
            .with_aspace(|aspace| kernel.vmm().copy_in_str(aspace.unwrap(), entry.entry, 256))
            .expect("program name at the entry point");
        let program = self
            .programs
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| panic!("no program called {name}"));
        let code = program(kernel, entry);
        kernel.sys_exit(code)
    }
}

impl ScriptedUser {
    pub fn register(
        &self,
        name: &str,
        program: impl Fn(&Arc<Kernel>, UserEntry) -> i32 + Send + Sync + 'static,
    ) {
        self.programs
            .lock()
            .unwrap()
            .insert(name.to_owned(), Arc::new(program));
    }

    /// Issues `fork` through the system call dispatcher from a fresh call
    /// site; the child runs `body` and exits with its result.
    pub fn fork(
        &self,
        kernel: &Arc<Kernel>,
        body: impl FnOnce(&Arc<Kernel>) -> i32 + Send + 'static,
    ) -> Result<Pid, i32> {
        let site = NEXT_FORK_SITE.fetch_add(8, Ordering::SeqCst);
        self.forks.lock().unwrap().insert(site, Box::new(body));
        let result = syscall_at(kernel, site, Sysno::Fork, [0; 4]);
        if result.is_err() {
            self.forks.lock().unwrap().remove(&site);
        }
        result.map(|pid| pid as Pid)
    }
}

/// Runs system call `call` and decodes `v0`/`a3`.
pub fn syscall(kernel: &Arc<Kernel>, call: Sysno, args: [u32; 4]) -> Result<u32, i32> {
    syscall_at(kernel, TEXT, call, args)
}

fn syscall_at(kernel: &Arc<Kernel>, epc: u32, call: Sysno, args: [u32; 4]) -> Result<u32, i32> {
    let mut tf = TrapFrame {
        v0: call as u32,
        a0: args[0],
        a1: args[1],
        a2: args[2],
        a3: args[3],
        epc,
        ..TrapFrame::default()
    };
    kernel.syscall(&mut tf);
    assert_eq!(tf.epc, epc + 4, "the syscall instruction is skipped");
    if tf.a3 == 0 {
        Ok(tf.v0)
    } else {
        Err(tf.v0 as i32)
    }
}

pub fn poke(kernel: &Kernel, addr: u32, bytes: &[u8]) -> Result<(), VmmError> {
    kernel
        .current_process()
        .with_aspace(|aspace| kernel.vmm().copy_out(aspace.unwrap(), va(addr), bytes))
}

pub fn poke_word(kernel: &Kernel, addr: u32, value: u32) -> Result<(), VmmError> {
    poke(kernel, addr, &value.to_be_bytes())
}

pub fn peek_word(kernel: &Kernel, addr: u32) -> Result<u32, VmmError> {
    kernel
        .current_process()
        .with_aspace(|aspace| kernel.vmm().copy_in_word(aspace.unwrap(), va(addr)))
}

pub fn peek_str(kernel: &Kernel, addr: u32) -> Result<String, VmmError> {
    kernel
        .current_process()
        .with_aspace(|aspace| kernel.vmm().copy_in_str(aspace.unwrap(), va(addr), 4096))
}

pub struct Env {
    pub kernel: Arc<Kernel>,
    pub threads: Arc<HostThreads>,
    pub fs: Arc<MemFs>,
    pub user: Arc<ScriptedUser>,
}

impl Env {
    pub fn new(frames: u32) -> Self {
        let boot = KernelBootInfo {
            ram_size: frames * PAGE_SIZE,
            first_free: 4 * PAGE_SIZE,
        };
        let threads = Arc::new(HostThreads::new());
        let fs = Arc::new(MemFs::default());
        let user = Arc::new(ScriptedUser::default());
        let kernel = Kernel::bootstrap(
            PhysicalMemory::new(boot.ram_size),
            &boot,
            Collaborators {
                vfs: fs.clone(),
                threads: threads.clone(),
                loader: Arc::new(FixedLoader),
                user: user.clone(),
            },
        );
        fs.install_program("/bin/init", "init");
        Self {
            kernel,
            threads,
            fs,
            user,
        }
    }

    /// Makes the test thread act as a loaded user process, `init`. Its
    /// data page and heap are usable right away.
    pub fn adopt_init(&self) -> Arc<Process> {
        let init = self.kernel.create_runprogram("init").unwrap();
        self.kernel.load_program(&init, "/bin/init", &[]).unwrap();
        self.threads.adopt(Some(init.clone()));
        init
    }

    /// Turns the test thread back into a kernel thread.
    pub fn leave(&self) {
        self.threads.adopt(None);
    }

    pub fn fork(&self, body: impl FnOnce(&Arc<Kernel>) -> i32 + Send + 'static) -> Result<Pid, i32> {
        self.user.fork(&self.kernel, body)
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        self.threads.adopt(None);
        if !std::thread::panicking() {
            self.threads.join_all();
        }
    }
}
