//! Per-(identity, subject) lanes.
//!
//! Requests for the same identity and subject run one at a time, so a
//! resubmission waits for the first run to settle and then hits the cache.
//! Unrelated pairs never wait on each other.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use audit_gate_core::{IdentityId, SubjectId};

type LaneKey = (IdentityId, SubjectId);

#[derive(Default)]
pub struct SubjectLanes {
    lanes: DashMap<LaneKey, Arc<Mutex<()>>>,
}

impl SubjectLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lane of `(identity, subject)`.
    pub async fn acquire(&self, identity: &IdentityId, subject: &SubjectId) -> LaneGuard<'_> {
        let key = (identity.clone(), subject.clone());
        let lane = self
            .lanes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lane.lock_owned().await;
        LaneGuard {
            lanes: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of lanes currently held or waited on.
    pub fn active(&self) -> usize {
        self.lanes.len()
    }
}

/// Held lane. The lane entry is dropped once nobody else is waiting on it.
pub struct LaneGuard<'a> {
    lanes: &'a SubjectLanes,
    key: LaneKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.lanes
            .lanes
            .remove_if(&self.key, |_, lane| Arc::strong_count(lane) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_pair_is_serialized() {
        let lanes = Arc::new(SubjectLanes::new());
        let alice = IdentityId::from("alice");
        let c1 = SubjectId::from("C1");

        let held = lanes.acquire(&alice, &c1).await;
        let waiter = {
            let lanes = lanes.clone();
            let (alice, c1) = (alice.clone(), c1.clone());
            tokio::spawn(async move {
                let _guard = lanes.acquire(&alice, &c1).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different subject is not blocked.
        let other = lanes.acquire(&alice, &SubjectId::from("C2")).await;
        drop(other);

        drop(held);
        waiter.await.unwrap();
        assert_eq!(lanes.active(), 0);
    }
}
