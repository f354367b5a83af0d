use kernel_info::limits::{FIRST_USER_FD, OPEN_MAX};
use kernel_proc::Errno;
use kernel_proc::file_handle::{DescriptorTable, FileHandle};
use kernel_proc::fs::{OpenFlags, Stat, Vnode};
use proptest::prelude::*;
use std::sync::Arc;

struct Null;

impl Vnode for Null {
    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize, Errno> {
        Ok(0)
    }

    fn write_at(&self, _offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        Ok(buf.len())
    }

    fn stat(&self) -> Stat {
        Stat::default()
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
enum Op {
    Assign(usize),
    Release(usize),
    Dup2(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    let fd = 0..OPEN_MAX + 2;
    prop_oneof![
        (0usize..4).prop_map(Op::Assign),
        fd.clone().prop_map(Op::Release),
        (fd.clone(), fd).prop_map(|(old, new)| Op::Dup2(old, new)),
    ]
}

proptest! {
    /// The table behaves like an array of optional handle indices.
    #[test]
    fn table_matches_a_plain_model(ops in prop::collection::vec(op(), 1..128)) {
        let handles: Vec<Arc<FileHandle>> = (0..4)
            .map(|i| FileHandle::new(format!("h{i}"), Arc::new(Null), OpenFlags::read_only()))
            .collect();
        let mut table = DescriptorTable::new();
        let mut model: Vec<Option<usize>> = vec![None; OPEN_MAX];

        for op in ops {
            match op {
                Op::Assign(h) => {
                    let expected = (FIRST_USER_FD..OPEN_MAX)
                        .find(|&fd| model[fd].is_none())
                        .ok_or(Errno::EMFILE);
                    prop_assert_eq!(table.assign(Arc::clone(&handles[h])), expected);
                    if let Ok(fd) = expected {
                        model[fd] = Some(h);
                    }
                }
                Op::Release(fd) => {
                    let expected = match model.get_mut(fd).and_then(Option::take) {
                        Some(_) => Ok(()),
                        None => Err(Errno::EBADF),
                    };
                    prop_assert_eq!(table.release(fd), expected);
                }
                Op::Dup2(old, new) => {
                    let source = model.get(old).copied().flatten();
                    let expected = match source {
                        Some(h) if new < OPEN_MAX => {
                            model[new] = Some(h);
                            Ok(new)
                        }
                        _ => Err(Errno::EBADF),
                    };
                    prop_assert_eq!(table.dup2(old, new), expected);
                }
            }

            prop_assert_eq!(table.open_count(), model.iter().flatten().count());
            for (fd, slot) in model.iter().enumerate() {
                match slot {
                    Some(h) => {
                        let got = table.get(fd);
                        prop_assert!(got.is_ok_and(|got| Arc::ptr_eq(&got, &handles[*h])));
                    }
                    None => prop_assert_eq!(table.get(fd).map(|_| ()), Err(Errno::EBADF)),
                }
            }
            for (h, handle) in handles.iter().enumerate() {
                let refs = model.iter().filter(|slot| **slot == Some(h)).count();
                prop_assert_eq!(Arc::strong_count(handle), 1 + refs);
            }
        }
    }
}
