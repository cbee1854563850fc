use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    column_family::{
        ColumnFamilyData, ColumnFamilyDescriptor, ColumnFamilyHandle, DEFAULT_COLUMN_FAMILY_NAME,
    },
    statistics::Statistics,
    table::TableFileSet,
    util::{Result, Status},
    version::{VersionEdit, VersionSet},
};

/// Manages all Column Families in a DB instance
///
/// ColumnFamilySet maintains:
/// - Map of CF ID → ColumnFamilyData, including dropped but not yet
///   destroyed ones
/// - Next CF ID allocation (IDs are never reused)
///
/// # Thread Safety
///
/// - Lookups take the read lock of the id map.
/// - `create` and `drop_column_family` are serialized by the coordination
///   lock and persist their manifest edit before changing the in-memory
///   state.
/// - Destruction removes the map entry under the write lock and deletes
///   files after releasing it.
///
/// # Lifecycle
///
/// ```text
/// DB Open → insert recovered CFs
///         ↓
/// create → manifest edit → registered, handle count 1
///         ↓
/// drop   → manifest edit → dropped flag set
///         ↓
/// last handle released → memtables freed, table files deleted, unregistered
/// ```
pub struct ColumnFamilySet {
    db_path: PathBuf,

    /// Map of CF ID → ColumnFamilyData
    column_families: RwLock<BTreeMap<u32, Arc<ColumnFamilyData>>>,

    /// Serializes create and drop
    coordination: Mutex<()>,

    /// Next CF ID to allocate
    next_id: AtomicU32,

    statistics: Arc<Statistics>,
}

impl ColumnFamilySet {
    pub fn new(db_path: &Path, next_id: u32, statistics: Arc<Statistics>) -> Self {
        ColumnFamilySet {
            db_path: db_path.to_path_buf(),
            column_families: RwLock::new(BTreeMap::new()),
            coordination: Mutex::new(()),
            next_id: AtomicU32::new(next_id),
            statistics,
        }
    }

    /// Register a column family rebuilt from the manifest
    pub(crate) fn insert(&self, cfd: Arc<ColumnFamilyData>) {
        self.next_id.fetch_max(cfd.id() + 1, Ordering::AcqRel);
        self.column_families.write().insert(cfd.id(), cfd);
    }

    /// Hand out a new handle to a registered column family
    pub(crate) fn handle(self: &Arc<Self>, cfd: Arc<ColumnFamilyData>) -> ColumnFamilyHandle {
        ColumnFamilyHandle::new(cfd, Arc::downgrade(self))
    }

    /// Create a new column family
    ///
    /// The manifest edit is durable before the column family becomes
    /// visible.
    pub fn create(
        self: &Arc<Self>,
        descriptor: ColumnFamilyDescriptor,
        versions: &VersionSet,
    ) -> Result<ColumnFamilyHandle> {
        descriptor.validate()?;
        let _guard = self.coordination.lock();

        // Names stay taken until the dropped column family is destroyed.
        if let Some(existing) = self.find_by_name(&descriptor.name) {
            return Err(Status::already_exists(if existing.is_dropped() {
                format!(
                    "Column family '{}' is dropped but still referenced",
                    descriptor.name
                )
            } else {
                format!("Column family '{}' already exists", descriptor.name)
            }));
        }

        let id = self.next_id.load(Ordering::Acquire);
        let mut edit = VersionEdit::new();
        edit.create_column_family(id, descriptor.name.clone(), descriptor.options.to_json()?);
        edit.set_next_cf_id(id + 1);
        versions.log_and_apply(edit)?;

        self.next_id.store(id + 1, Ordering::Release);
        let cfd = Arc::new(ColumnFamilyData::new(
            id,
            descriptor.name,
            descriptor.options,
            TableFileSet::new(),
            0,
        ));
        self.column_families.write().insert(id, cfd.clone());
        self.statistics.record_column_family_created();
        info!(id, name = cfd.name(), "created column family");

        Ok(self.handle(cfd))
    }

    /// Mark a column family dropped
    ///
    /// Data stays readable through existing handles until the last one is
    /// released.
    pub fn drop_column_family(
        &self,
        handle: &ColumnFamilyHandle,
        versions: &VersionSet,
    ) -> Result<()> {
        let cfd = handle.cfd();
        if cfd.name() == DEFAULT_COLUMN_FAMILY_NAME {
            return Err(Status::invalid_argument(
                "Cannot drop the default column family",
            ));
        }

        let _guard = self.coordination.lock();
        if cfd.is_dropped() {
            return Err(Status::not_found(format!(
                "Column family '{}' is already dropped",
                cfd.name()
            )));
        }

        let mut edit = VersionEdit::new();
        edit.drop_column_family(cfd.id());
        versions.log_and_apply(edit)?;

        cfd.set_dropped();
        self.statistics.record_column_family_dropped();
        info!(
            id = cfd.id(),
            name = cfd.name(),
            handles = cfd.handle_count(),
            "dropped column family"
        );
        Ok(())
    }

    /// Release one handle; destroys a dropped column family on the last one
    pub(crate) fn release(&self, cfd: &Arc<ColumnFamilyData>) {
        if cfd.unref() == 0 && cfd.is_dropped() {
            self.destroy(cfd);
        }
    }

    fn destroy(&self, cfd: &Arc<ColumnFamilyData>) {
        if !cfd.mark_destroyed() {
            return;
        }

        // A flush in progress finishes before its memtables go away.
        let tables = {
            let _flush = cfd.flush_lock().lock();
            self.column_families.write().remove(&cfd.id());
            cfd.clear()
        };

        let deleted = tables.delete_files(&self.db_path);
        if deleted < tables.len() {
            warn!(
                id = cfd.id(),
                remaining = tables.len() - deleted,
                "table files of destroyed column family left for next open"
            );
        }
        self.statistics.record_column_family_destroyed();
        info!(
            id = cfd.id(),
            name = cfd.name(),
            files = deleted,
            "destroyed column family"
        );
    }

    pub fn get(&self, id: u32) -> Option<Arc<ColumnFamilyData>> {
        self.column_families.read().get(&id).cloned()
    }

    /// Find a registered column family by name, dropped or not
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ColumnFamilyData>> {
        self.column_families
            .read()
            .values()
            .find(|cfd| cfd.name() == name)
            .cloned()
    }

    /// Names of every registered column family, ordered by id
    pub fn list(&self) -> Vec<String> {
        self.column_families
            .read()
            .values()
            .map(|cfd| cfd.name().to_string())
            .collect()
    }

    /// Every registered column family, ordered by id
    pub fn all(&self) -> Vec<Arc<ColumnFamilyData>> {
        self.column_families.read().values().cloned().collect()
    }

    /// Registered column families that are not dropped, ordered by id
    pub fn live(&self) -> Vec<Arc<ColumnFamilyData>> {
        self.column_families
            .read()
            .values()
            .filter(|cfd| !cfd.is_dropped())
            .cloned()
            .collect()
    }

    /// Oldest sequence some live column family still holds only in memory
    ///
    /// Log segments whose sequences are all below the result are no longer
    /// needed for recovery. Dropped column families do not hold segments.
    pub fn min_unflushed_sequence(&self, last_sequence: u64) -> u64 {
        self.column_families
            .read()
            .values()
            .filter(|cfd| !cfd.is_dropped())
            .filter_map(|cfd| cfd.oldest_unflushed_sequence())
            .min()
            .unwrap_or(last_sequence + 1)
    }

    pub fn next_id(&self) -> u32 {
        self.next_id.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.column_families.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.column_families.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        column_family::ColumnFamilyOptions, compression::CompressionType, db::WriteOp,
        util::Slice, version::ManifestState,
    };

    struct Fixture {
        _dir: TempDir,
        versions: VersionSet,
        set: Arc<ColumnFamilySet>,
        default: ColumnFamilyHandle,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(0, DEFAULT_COLUMN_FAMILY_NAME.to_string(), "{}".to_string());
        state.apply(&edit).unwrap();
        let versions = VersionSet::create(dir.path(), &state).unwrap();

        let set = Arc::new(ColumnFamilySet::new(
            dir.path(),
            1,
            Arc::new(Statistics::new()),
        ));
        let cfd = Arc::new(ColumnFamilyData::new(
            0,
            DEFAULT_COLUMN_FAMILY_NAME.to_string(),
            ColumnFamilyOptions::default(),
            TableFileSet::new(),
            0,
        ));
        set.insert(cfd.clone());
        let default = set.handle(cfd);

        Fixture {
            _dir: dir,
            versions,
            set,
            default,
        }
    }

    fn descriptor(name: &str) -> ColumnFamilyDescriptor {
        ColumnFamilyDescriptor::new(name, ColumnFamilyOptions::default())
    }

    #[test]
    fn test_create_allocates_fresh_ids() {
        let f = fixture();
        let users = f.set.create(descriptor("users"), &f.versions).unwrap();
        let posts = f.set.create(descriptor("posts"), &f.versions).unwrap();

        assert_eq!(users.id(), 1);
        assert_eq!(posts.id(), 2);
        assert_eq!(f.set.list(), vec!["default", "users", "posts"]);
        assert_eq!(users.cfd().handle_count(), 1);

        let err = f.set.create(descriptor("users"), &f.versions).unwrap_err();
        assert!(err.is_already_exists());

        // Persisted before registration
        let state = VersionSet::recover(f.versions.db_path()).unwrap();
        assert_eq!(state.column_family_names(), vec!["default", "users", "posts"]);
        assert_eq!(state.next_cf_id, 3);
    }

    #[test]
    fn test_drop_defers_destruction_until_last_release() {
        let f = fixture();
        let users = f.set.create(descriptor("users"), &f.versions).unwrap();
        let second = users.clone();
        assert_eq!(users.cfd().handle_count(), 2);

        f.set.drop_column_family(&users, &f.versions).unwrap();
        assert!(second.is_dropped());
        assert!(
            f.set
                .drop_column_family(&users, &f.versions)
                .unwrap_err()
                .is_not_found()
        );

        // The name is still taken
        let err = f.set.create(descriptor("users"), &f.versions).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(f.set.list(), vec!["default", "users"]);

        let cfd = users.cfd().clone();
        drop(users);
        assert!(!cfd.is_destroyed());
        drop(second);
        assert!(cfd.is_destroyed());
        assert_eq!(f.set.list(), vec!["default"]);

        // A recreated column family gets a new id
        let again = f.set.create(descriptor("users"), &f.versions).unwrap();
        assert_eq!(again.id(), 2);
    }

    #[test]
    fn test_destroy_deletes_table_files() {
        let f = fixture();
        let users = f.set.create(descriptor("users"), &f.versions).unwrap();
        let cfd = users.cfd().clone();
        cfd.apply(
            1,
            &WriteOp::Put {
                key: Slice::from("k"),
                value: Slice::from("v"),
            },
        );
        assert!(cfd.switch_memtable());
        let imm = cfd.oldest_immutable().unwrap();
        let (meta, reader) =
            TableFileSet::persist(f.versions.db_path(), 5, &imm, CompressionType::None).unwrap();
        cfd.install_flush_result(&imm, meta, reader, 1);

        let path = f.versions.db_path().join(crate::util::table_file_name(5));
        assert!(path.exists());

        f.set.drop_column_family(&users, &f.versions).unwrap();
        assert!(path.exists());
        drop(users);
        assert!(!path.exists());
        assert!(f.set.get(1).is_none());
    }

    #[test]
    fn test_default_cannot_be_dropped() {
        let f = fixture();
        let err = f.set.drop_column_family(&f.default, &f.versions).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_min_unflushed_sequence_skips_dropped() {
        let f = fixture();
        let users = f.set.create(descriptor("users"), &f.versions).unwrap();
        assert_eq!(f.set.min_unflushed_sequence(10), 11);

        let put = WriteOp::Put {
            key: Slice::from("k"),
            value: Slice::from("v"),
        };
        users.cfd().apply(4, &put);
        f.default.cfd().apply(7, &put);
        assert_eq!(f.set.min_unflushed_sequence(7), 4);

        f.set.drop_column_family(&users, &f.versions).unwrap();
        assert_eq!(f.set.min_unflushed_sequence(7), 7);
        assert_eq!(f.set.live().len(), 1);
        assert_eq!(f.set.all().len(), 2);
    }
}
