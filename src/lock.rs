//! Profile lock
//!
//! One spin lock guards node allocation, snapshot serialization and reset.
//! Interrupts are disabled for as long as it is held so an interrupt
//! handler running instrumented code on the same core cannot deadlock
//! against it.
//!
//! Holding a [`ProfLockGuard`] is how the rest of the crate proves the
//! lock is taken: the allocator and the serializer take `&ProfLockGuard`.

use spin::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// Interrupt masking, provided by the platform
pub trait IrqControl: Send + Sync {
    /// Disable interrupts, returning the previous state
    fn save(&self) -> usize;

    /// Restore the state returned by [`IrqControl::save`]
    fn restore(&self, flags: usize);
}

/// For hosts without interrupts (tests, user space)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIrq;

impl IrqControl for NoIrq {
    fn save(&self) -> usize {
        0
    }

    fn restore(&self, _flags: usize) {}
}

/// Interrupt-safe spin lock
pub struct ProfLock {
    inner: Mutex<()>,
    irq: Arc<dyn IrqControl>,
}

impl ProfLock {
    pub fn new() -> Self {
        Self::with_irq(Arc::new(NoIrq))
    }

    /// Create a lock that masks interrupts through `irq`
    pub fn with_irq(irq: Arc<dyn IrqControl>) -> Self {
        Self {
            inner: Mutex::new(()),
            irq,
        }
    }

    /// Disable interrupts and spin until the lock is ours
    pub fn lock(&self) -> ProfLockGuard<'_> {
        let flags = self.irq.save();
        let guard = self.inner.lock();
        ProfLockGuard {
            guard: Some(guard),
            irq: self.irq.as_ref(),
            flags,
        }
    }

    /// Check whether someone holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl Default for ProfLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProfLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Proof that the profile lock is held
///
/// Dropping it releases the lock first, then restores interrupts.
pub struct ProfLockGuard<'a> {
    guard: Option<MutexGuard<'a, ()>>,
    irq: &'a dyn IrqControl,
    flags: usize,
}

impl Drop for ProfLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.irq.restore(self.flags);
    }
}
