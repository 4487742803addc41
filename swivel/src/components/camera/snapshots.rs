use crate::components::camera::waypoint::WaypointId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// Image returned by the broker for a waypoint along with the time it arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Raw image body as sent by the broker.
    pub image: Bytes,
    /// Time the capture completed.
    pub captured_at: DateTime<Utc>,
}

/// Latest snapshot per waypoint. Each capture overwrites the previous one for
/// its waypoint, no history is kept. Clones share the same underlying map so
/// the web layer can read while the controller writes.
#[derive(Clone, Default, Debug)]
pub struct SnapshotStore {
    snapshots: Arc<RwLock<HashMap<WaypointId, Snapshot>>>,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot held for `waypoint`.
    pub fn insert(&self, waypoint: WaypointId, image: Bytes) {
        let snapshot = Snapshot {
            image,
            captured_at: Utc::now(),
        };
        // A panic while holding the lock cannot leave the map half written,
        // so a poisoned lock is still safe to use.
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(waypoint, snapshot);
    }

    /// Latest snapshot for `waypoint`, `None` if nothing was captured there yet.
    pub fn get(&self, waypoint: &str) -> Option<Snapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(waypoint)
            .cloned()
    }

    /// Number of waypoints with at least one capture.
    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True until the first capture lands.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
