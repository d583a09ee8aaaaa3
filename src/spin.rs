// SPDX-License-Identifier: Apache-2.0

//! Wrappers around spin types guarding the monitor state
//!
//! The MMU state lives in a [`Locked`], the enclave registry in a [`RwLocked`]. No code
//! path holds both at the same time.

use spin::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A wrapper around spin::Mutex serializing all page-table edits
pub struct Locked<A> {
    inner: Mutex<A>,
}

impl<A> Locked<A> {
    /// Constructor
    #[inline]
    pub const fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// get a [`MutexGuard`](spin::MutexGuard)
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock()
    }

    /// Run `f` with the lock held
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

/// A wrapper around spin::RwLock for state that is read far more often than written
pub struct RwLocked<A> {
    inner: RwLock<A>,
}

impl<A> RwLocked<A> {
    /// Constructor
    #[inline]
    pub const fn new(inner: A) -> Self {
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// get a [`RwLockReadGuard`](spin::RwLockReadGuard)
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, A> {
        self.inner.read()
    }

    /// get a [`RwLockWriteGuard`](spin::RwLockWriteGuard)
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, A> {
        self.inner.write()
    }
}
