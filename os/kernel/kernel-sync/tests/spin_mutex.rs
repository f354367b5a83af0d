use kernel_sync::host::HostContext;
use kernel_sync::irq::interrupts_enabled;
use kernel_sync::{IrqGuard, SleepMutex, SpinMutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn do_i_hold_tracks_the_holder() {
    let l = SpinMutex::new(());
    assert!(!l.do_i_hold());
    let g = l.lock();
    assert!(l.do_i_hold());
    thread::scope(|s| {
        s.spawn(|| assert!(!l.do_i_hold()));
    });
    drop(g);
    assert!(!l.do_i_hold());
}

#[test]
fn try_lock_records_the_holder_too() {
    let l = SpinMutex::new(1u8);
    let g = l.try_lock().expect("uncontended");
    assert!(l.do_i_hold());
    thread::scope(|s| {
        s.spawn(|| {
            assert!(l.try_lock().is_none());
            assert!(!l.do_i_hold());
        });
    });
    drop(g);
    assert!(!l.do_i_hold());
}

#[test]
#[should_panic(expected = "re-acquired by its holder")]
fn relocking_from_the_holder_panics() {
    let l = SpinMutex::new(0u8);
    let _g = l.lock();
    let _again = l.lock();
}

#[test]
fn guard_dropped_by_another_context_panics() {
    let l = SpinMutex::new(0u8);
    let g = l.lock();
    let res = thread::scope(|s| s.spawn(move || drop(g)).join());
    assert!(res.is_err(), "foreign release must be fatal");
}

#[test]
fn spinning_is_allowed_in_interrupt_context() {
    let spin = SpinMutex::new(0u32);
    HostContext::simulate_interrupt(|| {
        *spin.lock() += 1;
        assert!(!spin.do_i_hold());
    });
    assert_eq!(*spin.lock(), 1);

    // The sleeping variant refuses the same thing.
    let sleep = SleepMutex::new(0u32);
    let res = thread::scope(|s| {
        s.spawn(|| HostContext::simulate_interrupt(|| drop(sleep.lock())))
            .join()
    });
    assert!(res.is_err());
}

#[test]
fn lock_irq_masks_interrupts_while_held() {
    let l = SpinMutex::new(0u32);
    assert!(interrupts_enabled());
    {
        let mut g = l.lock_irq();
        *g = 5;
        assert!(!interrupts_enabled());
        assert!(l.do_i_hold());
    }
    assert!(interrupts_enabled());
    assert!(!l.do_i_hold());

    // Already masked: releasing the mutex must not unmask.
    let outer = IrqGuard::new();
    drop(l.lock_irq());
    assert!(!interrupts_enabled());
    drop(outer);
    assert!(interrupts_enabled());
}

#[test]
fn contending_irq_holders_see_only_themselves() {
    let threads = 6;
    let iters = 2_000;

    let lock = Arc::new(SpinMutex::new(0usize));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let (lock, inside, start) = (Arc::clone(&lock), Arc::clone(&inside), Arc::clone(&start));
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    let mut g = lock.lock_irq();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    assert!(lock.do_i_hold() && !interrupts_enabled());
                    *g += 1;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(g);
                    assert!(interrupts_enabled());
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*lock.lock(), threads * iters);
}

#[test]
fn default_builds_an_unlocked_mutex() {
    let l = SpinMutex::<Vec<u8>>::default();
    assert!(l.lock().is_empty());
    assert!(!l.do_i_hold());
    let s = SleepMutex::<u32>::default();
    assert_eq!(*s.lock(), 0);
}
