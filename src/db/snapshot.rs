use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

/// Snapshot provides a consistent point-in-time view of the database
///
/// Every column family read through the same snapshot observes the state as
/// of one sequence number. Clones share the snapshot; it is released when
/// the last clone is dropped.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    /// Sequence number at snapshot creation
    sequence: u64,
}

impl Snapshot {
    /// Create a snapshot at the given sequence number
    pub fn new(sequence: u64) -> Self {
        Snapshot {
            inner: Arc::new(SnapshotInner { sequence }),
        }
    }

    /// Get the snapshot's sequence number
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.inner.sequence
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Snapshots handed out by a DB that are still held somewhere
#[derive(Default)]
pub(crate) struct SnapshotList {
    snapshots: Mutex<Vec<Weak<SnapshotInner>>>,
}

impl SnapshotList {
    pub(crate) fn create(&self, sequence: u64) -> Snapshot {
        let snapshot = Snapshot::new(sequence);
        let mut snapshots = self.snapshots.lock();
        snapshots.retain(|s| s.strong_count() > 0);
        snapshots.push(Arc::downgrade(&snapshot.inner));
        snapshot
    }

    /// Number of snapshots not yet released
    pub(crate) fn len(&self) -> usize {
        self.snapshots
            .lock()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// Sequence of the oldest snapshot still held
    pub(crate) fn oldest(&self) -> Option<u64> {
        self.snapshots
            .lock()
            .iter()
            .filter_map(|s| s.upgrade())
            .map(|s| s.sequence)
            .min()
    }
}
