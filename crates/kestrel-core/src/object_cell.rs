//! Per-object reader/writer lock.
//!
//! `ObjectCell<T>` guards the mutable state of one object. Any number of
//! threads may hold the read side at once; the write side is exclusive.
//! Guards release on every exit path, including early returns and panics.
//!
//! # Lock discipline
//!
//! A thread that already holds a cell must not ask for it again in a way that
//! would wait on itself: a write request while holding a read or write guard,
//! or a read request while holding the write guard. These are programming
//! errors and panic instead of deadlocking. Nested reads are allowed.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

static NEXT_THREAD_TOKEN: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_TOKEN: usize = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
    // Addresses of cells this thread currently reads
    static HELD_READS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

fn thread_token() -> usize {
    THREAD_TOKEN.with(|t| *t)
}

/// Reader/writer protected object state.
pub struct ObjectCell<T> {
    value: RwLock<T>,
    /// Token of the thread holding the write guard, 0 when free
    writer: AtomicUsize,
}

impl<T> ObjectCell<T> {
    /// Create a new `ObjectCell` with the given value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            writer: AtomicUsize::new(0),
        }
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Acquire the shared lock.
    ///
    /// Panics if this thread holds the write lock.
    pub fn read(&self) -> ObjectCellRef<'_, T> {
        if self.writer.load(Ordering::Acquire) == thread_token() {
            panic!("lock-discipline violation: read lock requested while holding the write lock");
        }
        let inner = self.value.read_recursive();
        let address = self.address();
        HELD_READS.with(|held| held.borrow_mut().push(address));
        ObjectCellRef { inner, address }
    }

    /// Acquire the exclusive lock.
    ///
    /// Panics if this thread already holds this lock in either mode.
    pub fn write(&self) -> ObjectCellRefMut<'_, T> {
        let token = thread_token();
        if self.writer.load(Ordering::Acquire) == token {
            panic!("lock-discipline violation: write lock requested twice by the same thread");
        }
        let address = self.address();
        if HELD_READS.with(|held| held.borrow().contains(&address)) {
            panic!("lock-discipline violation: write lock requested while holding a read lock");
        }
        let inner = self.value.write();
        self.writer.store(token, Ordering::Release);
        ObjectCellRefMut {
            inner,
            writer: &self.writer,
        }
    }

    /// Run `f` under the shared lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.read();
        f(&guard)
    }

    /// Run `f` under the exclusive lock.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Mutable access without locking, through unique ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consume the cell and return the inner value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for ObjectCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObjectCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value.try_read_recursive() {
            Some(value) => f
                .debug_struct("ObjectCell")
                .field("value", &*value)
                .finish(),
            None => f
                .debug_struct("ObjectCell")
                .field("value", &"<locked>")
                .finish(),
        }
    }
}

/// Shared guard for `ObjectCell<T>`.
pub struct ObjectCellRef<'a, T> {
    inner: RwLockReadGuard<'a, T>,
    address: usize,
}

impl<T> Deref for ObjectCellRef<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> Drop for ObjectCellRef<'_, T> {
    fn drop(&mut self) {
        let address = self.address;
        HELD_READS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|a| *a == address) {
                held.swap_remove(pos);
            }
        });
    }
}

/// Exclusive guard for `ObjectCell<T>`.
pub struct ObjectCellRefMut<'a, T> {
    inner: RwLockWriteGuard<'a, T>,
    writer: &'a AtomicUsize,
}

impl<T> Deref for ObjectCellRefMut<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for ObjectCellRefMut<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for ObjectCellRefMut<'_, T> {
    fn drop(&mut self) {
        // Cleared before the inner guard unlocks
        self.writer.store(0, Ordering::Release);
    }
}
