//! Execution lock
//!
//! The single mutual-exclusion primitive guarding every dynamic value. A
//! thread must hold it while it runs dynamic code; native code may run
//! without it. The lock is reentrant per OS thread, so a dispatch stub
//! reached synchronously from dynamic code simply nests.
//!
//! Both guards are RAII: the lock is released (or reacquired, for a
//! [`Suspension`]) on every exit path, including error returns and panics.

use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

struct LockState {
    /// Thread currently holding the lock
    owner: Option<ThreadId>,
    /// Reentrancy depth of the owner
    depth: usize,
    /// Number of times ownership moved to a new thread
    handoffs: u64,
}

/// Reentrant execution lock for the dynamic side.
pub struct ExecutionLock {
    state: Mutex<LockState>,
    available: Condvar,
}

impl ExecutionLock {
    /// Create a new, unheld lock
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
                handoffs: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Acquire the lock for the current thread, blocking until available.
    pub fn acquire(&self) -> ExecutionGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
        } else {
            while state.owner.is_some() {
                self.available.wait(&mut state);
            }
            state.owner = Some(me);
            state.depth = 1;
            state.handoffs += 1;
        }
        ExecutionGuard::new(self)
    }

    /// Acquire the lock, giving up after `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<ExecutionGuard<'_>> {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
            return Some(ExecutionGuard::new(self));
        }
        while state.owner.is_some() {
            if self.available.wait_until(&mut state, deadline).timed_out() && state.owner.is_some() {
                return None;
            }
        }
        state.owner = Some(me);
        state.depth = 1;
        state.handoffs += 1;
        Some(ExecutionGuard::new(self))
    }

    /// Release the lock entirely if the current thread holds it.
    ///
    /// The returned guard reacquires the lock, at the same depth, when
    /// dropped. If the current thread does not hold the lock this is a no-op.
    pub fn suspend(&self) -> Suspension<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Suspension {
                lock: self,
                saved_depth: 0,
                _not_send: PhantomData,
            };
        }
        let saved_depth = state.depth;
        state.owner = None;
        state.depth = 0;
        drop(state);
        self.available.notify_one();
        tracing::trace!(depth = saved_depth, "execution lock suspended");
        Suspension {
            lock: self,
            saved_depth,
            _not_send: PhantomData,
        }
    }

    /// Check if the current thread holds the lock
    pub fn is_held(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Check if any thread holds the lock
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Number of ownership hand-offs between threads so far
    pub fn handoffs(&self) -> u64 {
        self.state.lock().handoffs
    }

    fn release_one(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.available.notify_one();
        }
    }

    fn reacquire(&self, depth: usize) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.owner.is_some() {
            self.available.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = depth;
        state.handoffs += 1;
    }
}

impl Default for ExecutionLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one level of the execution lock.
///
/// Not `Send`: the lock is owned by the thread that acquired it.
pub struct ExecutionGuard<'a> {
    lock: &'a ExecutionLock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ExecutionGuard<'a> {
    fn new(lock: &'a ExecutionLock) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_one();
    }
}

/// RAII guard for a released execution lock (reacquires on drop).
pub struct Suspension<'a> {
    lock: &'a ExecutionLock,
    saved_depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Suspension<'_> {
    /// Whether the lock was actually held (and therefore released)
    pub fn released(&self) -> bool {
        self.saved_depth > 0
    }
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        if self.saved_depth > 0 {
            self.lock.reacquire(self.saved_depth);
        }
    }
}
