//! Per-carrier mutual exclusion for transitions.
//!
//! # Responsibility
//! - Allow at most one in-flight transition per carrier within the process.
//! - Bound the wait so callers see contention instead of hanging.
//!
//! # Invariants
//! - A lease is released on drop, on every exit path.
//! - Leases on different carriers never wait on each other.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Lease acquisition did not complete in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeout {
    pub key: String,
    pub waited: Duration,
}

impl Display for LockTimeout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "carrier `{}` still busy after {} ms",
            self.key,
            self.waited.as_millis()
        )
    }
}

impl Error for LockTimeout {}

/// Registry of carriers with a transition in flight.
///
/// Share one registry (behind `Arc`) between every engine that writes to the
/// same database.
#[derive(Debug, Default)]
pub struct CarrierLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl CarrierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for exclusive use of `key`.
    pub fn acquire(&self, key: &str, timeout: Duration) -> Result<CarrierLease<'_>, LockTimeout> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while held.contains(key) {
            let wait = self.released.wait_until(&mut held, deadline);
            if wait.timed_out() && held.contains(key) {
                return Err(LockTimeout {
                    key: key.to_string(),
                    waited: timeout,
                });
            }
        }
        held.insert(key.to_string());

        Ok(CarrierLease {
            locks: self,
            key: key.to_string(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }

    fn release(&self, key: &str) {
        self.held.lock().remove(key);
        self.released.notify_all();
    }
}

/// Exclusive use of one carrier; released on drop.
#[derive(Debug)]
pub struct CarrierLease<'a> {
    locks: &'a CarrierLocks,
    key: String,
}

impl CarrierLease<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CarrierLease<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}
