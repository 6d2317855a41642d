//! Per-robot mutual exclusion.
//!
//! Commands for the same robot run one at a time; commands for different
//! robots never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use robofleet_domain::id::RobotId;

/// Registry of one async mutex per robot, created on first use.
#[derive(Debug, Default)]
pub struct RobotLocks {
    locks: Mutex<HashMap<RobotId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RobotLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `robot_id`. Access lasts until the guard is dropped.
    pub async fn acquire(&self, robot_id: RobotId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Nobody holds or waits on an entry whose only owner is the map.
            locks.retain(|id, lock| *id == robot_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(robot_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of robots with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn should_serialize_access_to_same_robot() {
        let locks = RobotLocks::new();
        let robot = RobotId::new();
        let _guard = locks.acquire(robot).await;

        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(robot)).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn should_not_block_other_robots() {
        let locks = RobotLocks::new();
        let _guard = locks.acquire(RobotId::new()).await;

        let other = tokio::time::timeout(Duration::from_millis(20), locks.acquire(RobotId::new())).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn should_prune_idle_entries() {
        let locks = RobotLocks::new();
        drop(locks.acquire(RobotId::new()).await);
        drop(locks.acquire(RobotId::new()).await);
        let _held = locks.acquire(RobotId::new()).await;
        assert_eq!(locks.len(), 1);
    }
}
