//! Reentrancy guard.
//!
//! A flag that is checked and set atomically on entry and cleared when the
//! returned handle drops, so every exit path (including `?` and panics)
//! releases it.

use crate::error::{FaucetError, FaucetResult};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

impl ReentrancyGuard {
    pub const fn new() -> Self {
        Self {
            entered: AtomicBool::new(false),
        }
    }

    /// Enter the critical section, or fail with `ReentrantCall` if a call is
    /// already in progress.
    pub fn enter(&self) -> FaucetResult<GuardHandle<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| FaucetError::ReentrantCall)?;
        Ok(GuardHandle { guard: self })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Held for the duration of a guarded call.
#[must_use = "the guard is released as soon as the handle is dropped"]
#[derive(Debug)]
pub struct GuardHandle<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardHandle<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}
