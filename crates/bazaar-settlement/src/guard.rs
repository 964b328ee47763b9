//! # Reentrancy Guard
//!
//! Tracks which thread is running a mutating engine call. The engine lock
//! alone would deadlock if a collaborator (the token adapter, a subscriber)
//! called back into the engine on the same thread. The guard turns that
//! into [`SettlementError::Reentrancy`]; other threads simply wait for the
//! lock.

use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::error::SettlementError;

/// Records the thread currently inside the engine.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    owner: Mutex<Option<ThreadId>>,
}

impl ReentrancyGuard {
    /// A guard with no call in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if the calling thread is already inside the engine.
    pub fn check(&self) -> Result<(), SettlementError> {
        if *self.owner.lock() == Some(thread::current().id()) {
            tracing::warn!("re-entrant engine call rejected");
            return Err(SettlementError::Reentrancy);
        }
        Ok(())
    }

    /// Mark the calling thread as inside the engine until the returned
    /// token is dropped.
    pub fn occupy(&self) -> Occupied<'_> {
        *self.owner.lock() = Some(thread::current().id());
        Occupied { guard: self }
    }

    /// Whether any thread is inside the engine.
    pub fn is_occupied(&self) -> bool {
        self.owner.lock().is_some()
    }
}

/// Clears the guard when dropped, including on unwind.
#[derive(Debug)]
pub struct Occupied<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for Occupied<'_> {
    fn drop(&mut self) {
        *self.guard.owner.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn same_thread_is_rejected_while_occupied() {
        let guard = ReentrancyGuard::new();
        guard.check().unwrap();
        {
            let _occupied = guard.occupy();
            assert_eq!(guard.check(), Err(SettlementError::Reentrancy));
        }
        guard.check().unwrap();
        assert!(!guard.is_occupied());
    }

    #[test]
    fn other_threads_are_not_rejected() {
        let guard = Arc::new(ReentrancyGuard::new());
        let _occupied = guard.occupy();
        let remote = Arc::clone(&guard);
        let result = thread::spawn(move || remote.check()).join().unwrap();
        assert!(result.is_ok());
    }
}
