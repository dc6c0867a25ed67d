#![forbid(unsafe_code)]

//! Fair reader/writer coordination for the descriptor registry.
//!
//! Readers (lookups, query planning, content loading, eviction) share the lock;
//! schema rebuilds take it exclusively. The underlying `parking_lot` lock is
//! task-fair: once a writer queues, later readers wait behind it, so a steady
//! stream of queries cannot starve a schema change.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader/writer lock with observable holder counts.
pub struct SchemaLock<T> {
    inner: RwLock<T>,
    readers: AtomicU32,
    writer: AtomicBool,
    write_acquisitions: AtomicU64,
}

/// Snapshot of lock state for observability.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Number of active readers.
    pub readers: u32,
    /// Whether the writer lock is held.
    pub writer: bool,
    /// Total number of exclusive acquisitions since creation.
    pub write_acquisitions: u64,
}

/// Guard representing a held shared lock.
pub struct ReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    lock: &'a SchemaLock<T>,
}

/// Guard representing a held exclusive lock.
pub struct WriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    lock: &'a SchemaLock<T>,
}

impl<T> SchemaLock<T> {
    /// Wraps `value` in a new lock.
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
            readers: AtomicU32::new(0),
            writer: AtomicBool::new(false),
            write_acquisitions: AtomicU64::new(0),
        }
    }

    /// Acquires a shared lock, blocking while a writer holds or awaits the lock.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let guard = self.inner.read();
        self.readers.fetch_add(1, Ordering::AcqRel);
        ReadGuard { guard, lock: self }
    }

    /// Acquires the exclusive lock, blocking until all readers have released it.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let guard = self.inner.write();
        self.writer.store(true, Ordering::Release);
        self.write_acquisitions.fetch_add(1, Ordering::AcqRel);
        WriteGuard { guard, lock: self }
    }

    /// Returns a snapshot of the current lock state.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            readers: self.readers.load(Ordering::Acquire),
            writer: self.writer.load(Ordering::Acquire),
            write_acquisitions: self.write_acquisitions.load(Ordering::Acquire),
        }
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.writer.store(false, Ordering::Release);
    }
}
