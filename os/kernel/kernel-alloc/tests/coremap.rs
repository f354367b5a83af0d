use kernel_alloc::{Coremap, FrameState, PhysicalMemory};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::PAGE_SIZE;
use kernel_vmem::{FrameAlloc, FrameKind, PhysMapper, PhysicalAddress};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

fn coremap(frames: u32) -> Coremap {
    let boot = KernelBootInfo {
        ram_size: frames * PAGE_SIZE,
        first_free: 2 * PAGE_SIZE,
    };
    Coremap::bootstrap(PhysicalMemory::new(boot.ram_size), &boot)
}

#[test]
fn concurrent_allocations_never_share_a_frame() {
    let cm = Arc::new(coremap(130));
    let seen = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cm = Arc::clone(&cm);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut mine = Vec::new();
                for _ in 0..32 {
                    let pa = cm.allocate_one(FrameKind::User).expect("enough frames");
                    cm.write_phys(pa, &[t; 8]);
                    assert!(seen.lock().unwrap().insert(pa), "frame {pa} handed out twice");
                    mine.push(pa);
                }
                for pa in &mine {
                    let mut buf = [0u8; 8];
                    cm.read_phys(*pa, &mut buf);
                    assert_eq!(buf, [t; 8], "frame {pa} was written by another thread");
                }
                mine
            })
        })
        .collect();

    let owned: Vec<PhysicalAddress> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(owned.len(), 128);
    assert_eq!(cm.free_frames(), 0);
    assert!(cm.allocate_one(FrameKind::User).is_none());

    for pa in owned {
        cm.free(pa);
    }
    assert_eq!(cm.free_frames(), 128);
}

#[test]
fn allocate_and_free_race_ends_balanced() {
    let cm = Arc::new(coremap(66));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cm = Arc::clone(&cm);
            thread::spawn(move || {
                for round in 0..200 {
                    let n = round % 3 + 1;
                    if let Some(run) = cm.alloc_kpages(n) {
                        assert_eq!(cm.state_of(run), Some(FrameState::Fixed));
                        cm.free_kpages(run);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(cm.free_frames(), cm.total_frames());
    assert_eq!(cm.used_bytes(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..5).prop_map(Op::Alloc),
        any::<usize>().prop_map(Op::Free),
    ]
}

proptest! {
    #[test]
    fn frames_are_conserved(ops in prop::collection::vec(op(), 1..64)) {
        let cm = coremap(34);
        let total = cm.total_frames();
        let mut live: Vec<(PhysicalAddress, usize)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(n) => {
                    if let Some(base) = cm.allocate_run(FrameKind::Kernel, n) {
                        for (other, len) in &live {
                            let a = base.frame_number() as usize;
                            let b = other.frame_number() as usize;
                            prop_assert!(a + n <= b || b + len <= a, "runs overlap");
                        }
                        live.push((base, n));
                    }
                }
                Op::Free(i) if !live.is_empty() => {
                    let (base, _) = live.swap_remove(i % live.len());
                    cm.free(base);
                }
                Op::Free(_) => {}
            }
            let held: usize = live.iter().map(|(_, n)| n).sum();
            prop_assert_eq!(cm.free_frames() + held, total);
            prop_assert_eq!(cm.used_bytes(), held * PAGE_SIZE as usize);
        }
    }
}
