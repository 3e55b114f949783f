//! Process-wide operation lock.
//!
//! Reservation resolution and transaction application both read lot balances
//! and write them back, so only one of them may run at a time. The lock is
//! reentrant: a lifecycle hook that applies transactions while its caller is
//! already inside a submit just deepens the current hold.
//!
//! Engine components all go through [`global`], so every service in the
//! process shares one hold whatever ledger handle it was built with.

use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug)]
struct Holder {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Reentrant mutual-exclusion lock serializing all ledger work.
///
/// Acquisition never fails; it blocks until the lock is free or already held
/// by the calling thread.
#[derive(Debug)]
pub struct OperationLock {
    holder: Mutex<Holder>,
    released: Condvar,
}

static OPERATION_LOCK: OperationLock = OperationLock::new();

/// The lock serializing ledger work for the whole process.
pub fn global() -> &'static OperationLock {
    &OPERATION_LOCK
}

impl Default for OperationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLock {
    pub const fn new() -> Self {
        Self {
            holder: Mutex::new(Holder { owner: None, depth: 0 }),
            released: Condvar::new(),
        }
    }

    /// Block until the current thread holds the lock.
    pub fn acquire(&self) -> OperationGuard<'_> {
        let me = thread::current().id();
        let mut holder = self.holder();

        loop {
            match holder.owner {
                None => {
                    holder.owner = Some(me);
                    holder.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    holder.depth += 1;
                    break;
                }
                Some(_) => {
                    holder = self
                        .released
                        .wait(holder)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        OperationGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.holder().owner == Some(thread::current().id())
    }

    /// Nesting depth of the current hold (0 when free).
    pub fn depth(&self) -> usize {
        self.holder().depth
    }

    // The inner mutex only guards the owner bookkeeping, never user code, so a
    // poisoned state is still accurate.
    fn holder(&self) -> MutexGuard<'_, Holder> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut holder = self.holder();
        holder.depth = holder.depth.saturating_sub(1);
        if holder.depth == 0 {
            holder.owner = None;
            drop(holder);
            self.released.notify_one();
        }
    }
}

/// Scoped hold on an [`OperationLock`]; released on drop, including while
/// unwinding or returning early with an error.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OperationGuard<'a> {
    lock: &'a OperationLock,
    // Release must happen on the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn same_thread_reentry_does_not_deadlock() {
        let lock = OperationLock::new();
        let outer = lock.acquire();
        {
            let _inner = lock.acquire();
            assert_eq!(lock.depth(), 2);
        }
        assert_eq!(lock.depth(), 1);
        drop(outer);
        assert_eq!(lock.depth(), 0);
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    fn released_on_error_path() {
        fn failing(lock: &OperationLock) -> Result<(), &'static str> {
            let _guard = lock.acquire();
            Err("boom")
        }

        let lock = OperationLock::new();
        assert!(failing(&lock).is_err());
        assert_eq!(lock.depth(), 0);
    }

    #[test]
    fn other_threads_are_excluded_while_held() {
        let lock = Arc::new(OperationLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let _guard = lock.acquire();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn global_lock_is_one_instance() {
        assert!(std::ptr::eq(global(), global()));
        let _guard = global().acquire();
        assert!(global().is_held_by_current_thread());
    }
}
