mod common;

use common::{DATA, Env, HEAP, poke_word, syscall, va};
use kernel_alloc::{FaultKind, VmmError};
use kernel_info::memory::{PAGE_SIZE, USERSTACK};
use kernel_proc::wait_status::SIGSEGV;
use kernel_proc::{Errno, Sysno};

#[allow(clippy::cast_sign_loss)]
const fn word(delta: i32) -> u32 {
    delta as u32
}

#[test]
fn sbrk_moves_the_break_and_returns_freed_pages() {
    let env = Env::new(64);
    env.adopt_init();
    let k = &env.kernel;
    let page = i32::try_from(PAGE_SIZE).unwrap();

    assert_eq!(syscall(k, Sysno::Sbrk, [0; 4]), Ok(HEAP));
    assert_eq!(syscall(k, Sysno::Sbrk, [2 * PAGE_SIZE, 0, 0, 0]), Ok(HEAP));
    poke_word(k, HEAP + PAGE_SIZE, 9).unwrap();

    let free = k.coremap().free_frames();
    assert_eq!(
        syscall(k, Sysno::Sbrk, [word(-page), 0, 0, 0]),
        Ok(HEAP + 2 * PAGE_SIZE)
    );
    assert_eq!(k.coremap().free_frames(), free + 1);
    assert_eq!(syscall(k, Sysno::Sbrk, [0; 4]), Ok(HEAP + PAGE_SIZE));

    assert_eq!(
        syscall(k, Sysno::Sbrk, [word(-3 * page), 0, 0, 0]),
        Err(Errno::EINVAL.code())
    );
    assert_eq!(
        syscall(k, Sysno::Sbrk, [0x7000_0000, 0, 0, 0]),
        Err(Errno::ENOMEM.code())
    );
    assert_eq!(k.sys_sbrk(0).map(|b| b.as_u32()), Ok(HEAP + PAGE_SIZE));
}

#[test]
fn sbrk_without_an_address_space_is_einval() {
    let env = Env::new(16);
    assert_eq!(env.kernel.sys_sbrk(0), Err(Errno::EINVAL));
}

#[test]
fn faults_inside_segments_are_resolved_and_cached() {
    let env = Env::new(64);
    env.adopt_init();
    let k = &env.kernel;

    let frame = k.vm_fault(FaultKind::Write, va(DATA + 8)).unwrap();
    assert_eq!(k.tlb().translate(va(DATA + 8)), frame.checked_add(8));
    assert_eq!(k.handle_user_fault(FaultKind::Read, va(DATA)), frame);

    assert!(k.vm_fault(FaultKind::Write, va(USERSTACK - 4)).is_ok());
    assert_eq!(
        k.vm_fault(FaultKind::Read, va(0x10)),
        Err(VmmError::SegmentationFault(va(0x10)))
    );
}

#[test]
fn kernel_threads_have_nothing_to_fault_in() {
    let env = Env::new(16);
    assert_eq!(
        env.kernel.vm_fault(FaultKind::Read, va(DATA)),
        Err(VmmError::NoAddressSpace)
    );
}

#[test]
fn unresolvable_user_fault_kills_with_sigsegv() {
    let env = Env::new(64);
    env.adopt_init();

    let pid = env
        .fork(|k| {
            let _ = k.handle_user_fault(FaultKind::Read, va(0x10));
            0
        })
        .unwrap();

    let status = env.kernel.waitpid(pid, 0).unwrap();
    assert!(status.is_signaled());
    assert_eq!(status.signal(), Some(SIGSEGV));
    assert_eq!(status.raw(), 45);
    assert_eq!(status.exit_code(), None);
}
