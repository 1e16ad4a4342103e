//! Per-member exclusive locks.
//!
//! Operations that touch several members take their locks in ascending id
//! order, so two operations over the same pair can never wait on each other
//! in a cycle. Every acquisition is bounded; a timeout surfaces as
//! [`LedgerError::Busy`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{LedgerError, Result};

type Registry = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

pub struct MemberLocks {
    registry: Registry,
    timeout: Duration,
}

impl MemberLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            registry: Arc::default(),
            timeout,
        }
    }

    /// Lock every listed member. Duplicates are ignored.
    pub async fn acquire(&self, member_ids: &[&str]) -> Result<MemberGuard> {
        let mut ids: Vec<&str> = member_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut guard = MemberGuard {
            registry: self.registry.clone(),
            ids: ids.iter().map(|id| id.to_string()).collect(),
            held: Vec::with_capacity(ids.len()),
        };
        for id in ids {
            let slot = self.slot(id);
            match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
                Ok(held) => guard.held.push(held),
                Err(_) => {
                    debug!(member_id = %id, timeout = ?self.timeout, "Member lock timed out");
                    return Err(LedgerError::Busy(id.to_string()));
                }
            }
        }
        Ok(guard)
    }

    /// Number of members with a live lock slot.
    pub fn tracked(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, id: &str) -> Arc<Mutex<()>> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

/// Held member locks; released on drop.
pub struct MemberGuard {
    registry: Registry,
    ids: Vec<String>,
    held: Vec<OwnedMutexGuard<()>>,
}

impl Drop for MemberGuard {
    fn drop(&mut self) {
        self.held.clear();

        // Drop slots nobody else is holding or waiting on. Waiters keep a
        // clone of the Arc, so a count of one means only the registry has it.
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            if registry
                .get(id)
                .is_some_and(|slot| Arc::strong_count(slot) == 1)
            {
                registry.remove(id);
            }
        }
    }
}
