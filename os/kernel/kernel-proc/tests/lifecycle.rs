mod common;

use common::{Env, TEXT, syscall};
use kernel_info::limits::OPEN_MAX;
use kernel_proc::{Errno, ProcState, Sysno, TrapFrame};
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[test]
fn the_kernel_process_is_pid_zero() {
    let env = Env::new(32);
    let k = &env.kernel;
    let kproc = k.kernel_process();

    assert_eq!(kproc.pid(), 0);
    assert!(kproc.cwd().is_some());
    assert!(!kproc.has_aspace());
    assert!(Arc::ptr_eq(&k.current_process(), kproc));
    assert_eq!(k.sys_getpid(), 0);
    assert!(k.lookup(0).is_none());
    assert_eq!(k.process_count(), 0);
}

#[test]
fn new_programs_start_with_the_console() {
    let env = Env::new(32);
    let k = &env.kernel;

    let proc = k.create_runprogram("sh").unwrap();
    assert_eq!(proc.pid(), 1);
    assert_eq!(proc.parent(), Some(0));
    assert_eq!(proc.state(), ProcState::Created);
    assert!(!proc.has_aspace());
    assert!(Arc::ptr_eq(
        &proc.cwd().unwrap(),
        &k.kernel_process().cwd().unwrap()
    ));
    assert!(Arc::ptr_eq(&k.lookup(1).unwrap(), &proc));

    {
        let files = proc.files();
        assert_eq!(files.open_count(), 3);
        let stdin = files.get(0).unwrap();
        assert!(stdin.flags().can_read() && !stdin.flags().can_write());
        assert_eq!(stdin.write(b"x"), Err(Errno::EBADF));
        for fd in [1, 2] {
            let out = files.get(fd).unwrap();
            assert!(out.flags().can_write() && !out.flags().can_read());
        }
        files.get(2).unwrap().write(b"oops").unwrap();
    }
    assert_eq!(env.fs.console.output.lock().unwrap().as_slice(), b"oops");

    k.destroy_process(&proc);
    assert_eq!(proc.state(), ProcState::Reaped);
    assert_eq!(proc.files().open_count(), 0);
    assert!(proc.cwd().is_none());
    assert!(k.lookup(1).is_none());
}

#[test]
fn a_broken_console_leaves_nothing_behind() {
    let env = Env::new(32);
    env.fs.console_broken.store(true, Ordering::SeqCst);
    assert_eq!(
        env.kernel.create_runprogram("sh").map(|p| p.pid()),
        Err(Errno::ENOENT)
    );
    assert_eq!(env.kernel.process_count(), 0);
}

#[test]
fn destroying_a_loaded_process_returns_its_memory() {
    let env = Env::new(64);
    let k = &env.kernel;
    let free = k.coremap().free_frames();

    let proc = k.create_runprogram("init").unwrap();
    k.load_program(&proc, "/bin/init", &[]).unwrap();
    assert!(k.coremap().free_frames() < free);

    k.destroy_process(&proc);
    assert!(!proc.has_aspace());
    assert_eq!(k.coremap().free_frames(), free);
}

#[test]
#[should_panic(expected = "cannot be destroyed")]
fn the_kernel_process_cannot_be_destroyed() {
    let env = Env::new(16);
    let kproc = Arc::clone(env.kernel.kernel_process());
    env.kernel.destroy_process(&kproc);
}

#[test]
fn dup2_and_close_through_the_dispatcher() {
    let env = Env::new(64);
    let init = env.adopt_init();
    let k = &env.kernel;
    let max = u32::try_from(OPEN_MAX).unwrap();

    assert_eq!(syscall(k, Sysno::Dup2, [1, 5, 0, 0]), Ok(5));
    {
        let files = init.files();
        assert!(Arc::ptr_eq(&files.get(1).unwrap(), &files.get(5).unwrap()));
    }
    assert_eq!(syscall(k, Sysno::Close, [5, 0, 0, 0]), Ok(0));
    assert_eq!(syscall(k, Sysno::Close, [5, 0, 0, 0]), Err(Errno::EBADF.code()));
    assert_eq!(syscall(k, Sysno::Close, [u32::MAX, 0, 0, 0]), Err(Errno::EBADF.code()));
    assert_eq!(syscall(k, Sysno::Dup2, [9, 3, 0, 0]), Err(Errno::EBADF.code()));
    assert_eq!(syscall(k, Sysno::Dup2, [1, max, 0, 0]), Err(Errno::EBADF.code()));
    assert!(init.files().get(1).is_ok());
}

#[test]
fn unknown_calls_are_enosys() {
    let env = Env::new(16);
    let mut tf = TrapFrame {
        v0: 1,
        epc: TEXT,
        ..TrapFrame::default()
    };
    env.kernel.syscall(&mut tf);
    assert_eq!(tf.v0, 1, "ENOSYS");
    assert_eq!(tf.a3, 1);
    assert_eq!(tf.epc, TEXT + 4);
}

#[test]
fn getpid_through_the_dispatcher() {
    let env = Env::new(64);
    let init = env.adopt_init();
    assert_eq!(
        syscall(&env.kernel, Sysno::Getpid, [0; 4]),
        Ok(u32::try_from(init.pid()).unwrap())
    );
}

#[test]
fn shutdown_counts_processes_never_waited_for() {
    let env = Env::new(64);
    env.adopt_init();
    let pid = env.fork(|_| 0).unwrap();
    env.threads.join_all();
    env.leave();

    assert_eq!(env.kernel.lookup(pid).unwrap().state(), ProcState::Exited);
    assert_eq!(env.kernel.shutdown(), 2);
}

#[test]
#[should_panic(expected = "kernel shut down twice")]
fn shutting_down_twice_is_fatal() {
    let env = Env::new(16);
    assert_eq!(env.kernel.shutdown(), 0);
    let _ = env.kernel.shutdown();
}
