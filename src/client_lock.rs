//! Client-wide mutual exclusion guarding every public entry point on
//! [`crate::client::Aeron`].
//!
//! Modeled as a trait so the facade is generic over the exclusion
//! primitive rather than hard-coding one: [`ReentrantClientLock`] (the
//! default) wraps [`parking_lot::ReentrantMutex`] so a conductor callback
//! invoked re-entrantly from inside a locked call doesn't deadlock;
//! [`NoOpLock`] is for the single-threaded `AgentInvoker` case where the
//! application guarantees it never calls in from more than one thread and
//! paying for synchronization would be wasted work.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Exclusion primitive guarding the facade's public operations. The guard
/// type is an associated type so implementations can return a real RAII
/// guard (held only for the duration of one call) without boxing it.
pub trait ClientLock: Send + Sync {
    /// RAII guard released when dropped.
    type Guard<'a>
    where
        Self: 'a;

    /// Acquire the lock, blocking if necessary.
    fn lock(&self) -> Self::Guard<'_>;
}

/// Default lock: a reentrant mutex, so a callback fired from inside the
/// conductor (itself invoked while a caller holds the lock) can safely
/// call back into a locked facade method without deadlocking the calling
/// thread.
#[derive(Default)]
pub struct ReentrantClientLock {
    mutex: ReentrantMutex<()>,
}

impl ClientLock for ReentrantClientLock {
    type Guard<'a> = ReentrantMutexGuard<'a, ()>;

    fn lock(&self) -> Self::Guard<'_> {
        self.mutex.lock()
    }
}

/// A lock that never actually excludes anything. Sound only when the
/// embedding application guarantees single-threaded access, which is
/// exactly the case `useConductorAgentInvoker` is meant to cover: the same
/// thread that ticks the invoker is the only thread calling in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLock;

/// Guard returned by [`NoOpLock`]; holds nothing and does nothing on drop.
#[derive(Debug)]
pub struct NoOpGuard;

impl ClientLock for NoOpLock {
    type Guard<'a> = NoOpGuard;

    fn lock(&self) -> Self::Guard<'_> {
        NoOpGuard
    }
}

/// Pairs a [`ClientLock`] with the data it exclusively guards. Mirrors how
/// `lock_api::Mutex<R, T>` is built from a raw lock plus an `UnsafeCell` —
/// which is how `parking_lot`'s own `Mutex` is implemented under this
/// crate's dependency — so [`crate::client::Aeron`] can share one
/// [`crate::client_conductor::ClientConductor`] between application
/// threads and the harness thread without boxing every access.
///
/// `ReentrantClientLock` lets the same thread re-acquire the lock without
/// deadlocking, but a second live `&mut T` handed out while the first is
/// still on the call stack would alias it — undefined behavior, lock or no
/// lock. `with_lock` closes that gap with a borrow flag: a nested call
/// panics instead of aliasing. In practice this means a registration
/// callback (`availableImageHandler`/`unavailableImageHandler`, the error
/// handler) must not call back into an `Aeron`/`ClientConductor` method
/// synchronously; queue the follow-up work and issue it on the next tick
/// instead.
pub struct Exclusive<L, T> {
    lock: L,
    borrowed: std::cell::Cell<bool>,
    data: std::cell::UnsafeCell<T>,
}

// Safety: every access to `data` (and `borrowed`) goes through `with_lock`,
// which holds `lock` for the closure's duration; `L: ClientLock` guarantees
// that's exclusive, and `T: Send` is what lets the guarded value cross
// threads at all.
unsafe impl<L: ClientLock, T: Send> Sync for Exclusive<L, T> {}

impl<L, T> Exclusive<L, T>
where
    L: ClientLock,
{
    pub fn new(lock: L, data: T) -> Self {
        Exclusive { lock, borrowed: std::cell::Cell::new(false), data: std::cell::UnsafeCell::new(data) }
    }

    /// Run `f` with exclusive access to the guarded data.
    ///
    /// # Panics
    /// Panics if called reentrantly while a prior `with_lock` call on the
    /// same `Exclusive` is still running (e.g. from inside a callback `f`
    /// itself invoked).
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _guard = self.lock.lock();
        assert!(!self.borrowed.get(), "Exclusive::with_lock called reentrantly while already borrowed");
        self.borrowed.set(true);
        let _reset = BorrowedReset { borrowed: &self.borrowed };
        // Safety: `_guard` is held for the duration of this call, no other
        // code path ever reaches `data` without first acquiring it, and the
        // `borrowed` check above rules out a second live `&mut T` from a
        // reentrant call on this same thread.
        f(unsafe { &mut *self.data.get() })
    }
}

/// Clears `borrowed` on scope exit, including on unwind, so a panicking
/// callback doesn't permanently wedge the `Exclusive` against every future
/// call.
struct BorrowedReset<'a> {
    borrowed: &'a std::cell::Cell<bool>,
}

impl Drop for BorrowedReset<'_> {
    fn drop(&mut self) {
        self.borrowed.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_lock_allows_nested_acquire_on_same_thread() {
        let lock = ReentrantClientLock::default();
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn noop_lock_never_blocks() {
        let lock = NoOpLock;
        let _a = lock.lock();
        let _b = lock.lock();
    }

    #[test]
    fn exclusive_serializes_access_through_reentrant_lock() {
        let guarded = Exclusive::new(ReentrantClientLock::default(), 0i32);
        guarded.with_lock(|value| *value += 1);
        guarded.with_lock(|value| *value += 1);
        assert_eq!(guarded.with_lock(|value| *value), 2);
    }

    #[test]
    #[should_panic(expected = "reentrantly")]
    fn exclusive_panics_on_reentrant_borrow() {
        let guarded = Exclusive::new(ReentrantClientLock::default(), 0i32);
        guarded.with_lock(|_| {
            guarded.with_lock(|value| *value += 1);
        });
    }

    #[test]
    fn borrowed_flag_resets_after_a_panicking_callback() {
        let guarded = std::panic::AssertUnwindSafe(Exclusive::new(NoOpLock, 0i32));
        let result = std::panic::catch_unwind(|| {
            guarded.with_lock(|_| panic!("callback blew up"));
        });
        assert!(result.is_err());

        // A prior unwind must not leave `borrowed` stuck at `true`.
        assert_eq!(guarded.with_lock(|value| *value), 0);
    }
}
