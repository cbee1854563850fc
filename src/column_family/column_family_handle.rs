use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::column_family::{ColumnFamilyData, ColumnFamilySet};

/// Handle to a Column Family
///
/// A reference-counted token used in put/get/delete/iterator operations.
/// Cloning a handle adds a reference; dropping one releases it.
///
/// # Lifetime
///
/// A handle stays usable after its column family is dropped: reads keep
/// working and writes fail with `ColumnFamilyDropped`. The column family's
/// memtables and table files are destroyed when the last handle to a
/// dropped column family is released.
///
/// # Example
///
/// ```ignore
/// use cfstore::{DB, DBOptions, WriteOptions, ReadOptions};
///
/// let db = DB::open(DBOptions::default(), "mydb")?;
/// let users = db.create_column_family("users", Default::default())?;
///
/// db.put_cf(&WriteOptions::default(), &users, "key1", "value1")?;
/// let value = db.get_cf(&ReadOptions::default(), &users, "key1")?;
/// ```
pub struct ColumnFamilyHandle {
    cfd: Arc<ColumnFamilyData>,
    set: Weak<ColumnFamilySet>,
}

impl ColumnFamilyHandle {
    pub(crate) fn new(cfd: Arc<ColumnFamilyData>, set: Weak<ColumnFamilySet>) -> Self {
        cfd.acquire();
        ColumnFamilyHandle { cfd, set }
    }

    /// Get the column family ID
    pub fn id(&self) -> u32 {
        self.cfd.id()
    }

    /// Get the column family name
    pub fn name(&self) -> &str {
        self.cfd.name()
    }

    /// The column family has been dropped; it may still be readable
    pub fn is_dropped(&self) -> bool {
        self.cfd.is_dropped()
    }

    pub(crate) fn cfd(&self) -> &Arc<ColumnFamilyData> {
        &self.cfd
    }
}

impl Clone for ColumnFamilyHandle {
    fn clone(&self) -> Self {
        ColumnFamilyHandle::new(self.cfd.clone(), self.set.clone())
    }
}

impl Drop for ColumnFamilyHandle {
    fn drop(&mut self) {
        match self.set.upgrade() {
            Some(set) => set.release(&self.cfd),
            // The DB is gone; nothing left to destroy.
            None => {
                self.cfd.unref();
            },
        }
    }
}

impl PartialEq for ColumnFamilyHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cfd, &other.cfd)
    }
}

impl Eq for ColumnFamilyHandle {}

impl fmt::Debug for ColumnFamilyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamilyHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("dropped", &self.is_dropped())
            .finish()
    }
}
