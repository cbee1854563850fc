use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use parking_lot::{Mutex, RwLock};

use crate::{
    column_family::ColumnFamilyOptions,
    db::WriteOp,
    iterator::{InternalIterator, MemTableIterator},
    memtable::MemTable,
    merge::GetContext,
    table::{TableFileSet, TableReader},
    util::Status,
    version::FileMetaData,
};

/// Everything a reader needs from one column family, captured at one moment
///
/// A super version is never mutated; switches and flushes install a new one.
/// Readers clone the `Arc` and keep using it while newer versions appear.
pub struct SuperVersion {
    /// Active MemTable (receives new writes)
    pub mem: Arc<MemTable>,
    /// Immutable MemTables awaiting flush, oldest first
    pub imms: Vec<Arc<MemTable>>,
    pub tables: TableFileSet,
}

impl SuperVersion {
    /// Look `ctx.key()` up from the newest source to the oldest
    pub fn get(&self, ctx: &mut GetContext<'_>, snapshot: u64) -> bool {
        if self.mem.get(ctx, snapshot) {
            return true;
        }
        for imm in self.imms.iter().rev() {
            if imm.get(ctx, snapshot) {
                return true;
            }
        }
        self.tables.lookup(ctx, snapshot)
    }

    /// Child iterators for a merging iterator, newest source first
    pub fn iterators(&self) -> Vec<Box<dyn InternalIterator>> {
        let mut children: Vec<Box<dyn InternalIterator>> =
            Vec::with_capacity(1 + self.imms.len() + self.tables.len());
        children.push(Box::new(MemTableIterator::new(self.mem.clone())));
        for imm in self.imms.iter().rev() {
            children.push(Box::new(MemTableIterator::new(imm.clone())));
        }
        children.extend(self.tables.iterators());
        children
    }

    /// Oldest sequence not yet persisted in a table file
    pub fn oldest_unflushed_sequence(&self) -> Option<u64> {
        self.imms
            .iter()
            .chain(std::iter::once(&self.mem))
            .find_map(|m| m.first_sequence())
    }
}

/// Internal data for a Column Family
///
/// # Lifecycle
///
/// ```text
/// create → live ──drop──→ dropped ──last handle released──→ destroyed
///            │                 │
///         writes ok       writes rejected, reads ok
/// ```
///
/// # Thread Safety
///
/// - The super version is swapped under a short `RwLock`.
/// - Memtable inserts and switches are serialized by the DB write lock.
/// - `flush_lock` keeps flushes of this column family one at a time.
pub struct ColumnFamilyData {
    /// Column family ID (unique across DB, never reused)
    id: u32,

    /// Column family name
    name: String,

    /// Configuration options for this CF
    options: ColumnFamilyOptions,

    super_version: RwLock<Arc<SuperVersion>>,

    /// Every sequence at or below this is in a table file
    flushed_sequence: AtomicU64,

    dropped: AtomicBool,
    destroyed: AtomicBool,

    /// Number of live `ColumnFamilyHandle`s
    refs: AtomicUsize,

    flush_lock: Mutex<()>,

    /// Set when a flush failed for good; rejects further writes
    background_error: Mutex<Option<Status>>,
}

impl ColumnFamilyData {
    pub fn new(
        id: u32,
        name: String,
        options: ColumnFamilyOptions,
        tables: TableFileSet,
        flushed_sequence: u64,
    ) -> Self {
        ColumnFamilyData {
            id,
            name,
            options,
            super_version: RwLock::new(Arc::new(SuperVersion {
                mem: Arc::new(MemTable::new()),
                imms: Vec::new(),
                tables,
            })),
            flushed_sequence: AtomicU64::new(flushed_sequence),
            dropped: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            refs: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
            background_error: Mutex::new(None),
        }
    }

    /// Get the column family ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get the column family name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the column family options
    pub fn options(&self) -> &ColumnFamilyOptions {
        &self.options
    }

    /// Pin the current memtables and table files
    pub fn super_version(&self) -> Arc<SuperVersion> {
        self.super_version.read().clone()
    }

    /// Apply one write. The caller holds the DB write lock.
    pub fn apply(&self, sequence: u64, op: &WriteOp) {
        let mem = self.super_version.read().mem.clone();
        mem.add(sequence, op.value_type(), op.key().clone(), op.value());
    }

    /// Check if MemTable should be flushed
    pub fn should_flush(&self) -> bool {
        self.super_version.read().mem.approximate_memory_usage() >= self.options.write_buffer_size
    }

    /// Make the active MemTable immutable and install a fresh one. The
    /// caller holds the DB write lock.
    ///
    /// Returns false when the active MemTable is empty.
    pub fn switch_memtable(&self) -> bool {
        let mut sv = self.super_version.write();
        if sv.mem.is_empty() {
            return false;
        }

        let mut imms = sv.imms.clone();
        imms.push(sv.mem.clone());
        *sv = Arc::new(SuperVersion {
            mem: Arc::new(MemTable::new()),
            imms,
            tables: sv.tables.clone(),
        });
        true
    }

    pub fn oldest_immutable(&self) -> Option<Arc<MemTable>> {
        self.super_version.read().imms.first().cloned()
    }

    /// Replace the flushed `imm` by the table file holding its content
    pub fn install_flush_result(
        &self,
        imm: &Arc<MemTable>,
        meta: FileMetaData,
        reader: Arc<TableReader>,
        flushed_sequence: u64,
    ) {
        let mut sv = self.super_version.write();
        let imms = sv
            .imms
            .iter()
            .filter(|m| !Arc::ptr_eq(m, imm))
            .cloned()
            .collect();
        *sv = Arc::new(SuperVersion {
            mem: sv.mem.clone(),
            imms,
            tables: sv.tables.with_table(meta, reader),
        });
        self.flushed_sequence
            .fetch_max(flushed_sequence, Ordering::AcqRel);
    }

    pub fn oldest_unflushed_sequence(&self) -> Option<u64> {
        self.super_version.read().oldest_unflushed_sequence()
    }

    pub fn flushed_sequence(&self) -> u64 {
        self.flushed_sequence.load(Ordering::Acquire)
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    pub(crate) fn set_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Returns true for exactly one caller
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    /// Drop memtables and forget table files; returns the forgotten files
    pub(crate) fn clear(&self) -> TableFileSet {
        let mut sv = self.super_version.write();
        let tables = sv.tables.clone();
        *sv = Arc::new(SuperVersion {
            mem: Arc::new(MemTable::new()),
            imms: Vec::new(),
            tables: TableFileSet::new(),
        });
        tables
    }

    pub(crate) fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the number of handles left
    pub(crate) fn unref(&self) -> usize {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn handle_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub(crate) fn flush_lock(&self) -> &Mutex<()> {
        &self.flush_lock
    }

    pub fn background_error(&self) -> Option<Status> {
        self.background_error.lock().clone()
    }

    pub(crate) fn set_background_error(&self, status: Status) {
        let mut guard = self.background_error.lock();
        if guard.is_none() {
            *guard = Some(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{compression::CompressionType, util::Slice};

    fn cfd() -> ColumnFamilyData {
        ColumnFamilyData::new(
            1,
            "test_cf".to_string(),
            ColumnFamilyOptions {
                write_buffer_size: 64,
                ..Default::default()
            },
            TableFileSet::new(),
            0,
        )
    }

    fn put(key: &str, value: &str) -> WriteOp {
        WriteOp::Put {
            key: Slice::from(key),
            value: Slice::from(value),
        }
    }

    fn get(cfd: &ColumnFamilyData, key: &str) -> Option<Slice> {
        let mut ctx = GetContext::new(Slice::from(key), None);
        cfd.super_version().get(&mut ctx, u64::MAX);
        ctx.finish().unwrap()
    }

    #[test]
    fn test_column_family_data_creation() {
        let cf = cfd();
        assert_eq!(cf.id(), 1);
        assert_eq!(cf.name(), "test_cf");
        assert_eq!(cf.handle_count(), 0);
        assert!(!cf.should_flush());
        assert!(!cf.is_dropped());
        assert_eq!(cf.oldest_unflushed_sequence(), None);
    }

    #[test]
    fn test_switch_memtable() {
        let cf = cfd();
        // Nothing to switch while empty
        assert!(!cf.switch_memtable());

        cf.apply(3, &put("a", "1"));
        let pinned = cf.super_version();
        assert!(cf.switch_memtable());
        cf.apply(4, &put("b", "2"));

        let sv = cf.super_version();
        assert_eq!(sv.imms.len(), 1);
        assert_eq!(cf.oldest_unflushed_sequence(), Some(3));
        assert_eq!(get(&cf, "a"), Some(Slice::from("1")));
        assert_eq!(get(&cf, "b"), Some(Slice::from("2")));

        // The pinned version still sees the old layout.
        assert!(pinned.imms.is_empty());
        assert_eq!(pinned.mem.num_entries(), 1);
    }

    #[test]
    fn test_install_flush_result() {
        let dir = TempDir::new().unwrap();
        let cf = cfd();
        cf.apply(1, &put("a", "1"));
        cf.apply(2, &put("b", "2"));
        assert!(cf.switch_memtable());
        cf.apply(3, &put("c", "3"));

        let imm = cf.oldest_immutable().unwrap();
        let (meta, reader) =
            TableFileSet::persist(dir.path(), 9, &imm, CompressionType::None).unwrap();
        cf.install_flush_result(&imm, meta, reader, 2);

        let sv = cf.super_version();
        assert!(sv.imms.is_empty());
        assert_eq!(sv.tables.file_numbers(), vec![9]);
        assert_eq!(cf.flushed_sequence(), 2);
        assert_eq!(cf.oldest_unflushed_sequence(), Some(3));
        assert_eq!(get(&cf, "a"), Some(Slice::from("1")));
        assert_eq!(sv.iterators().len(), 2);
    }

    #[test]
    fn test_should_flush_and_refs() {
        let cf = cfd();
        cf.apply(1, &put("key", &"x".repeat(100)));
        assert!(cf.should_flush());

        cf.acquire();
        cf.acquire();
        assert_eq!(cf.unref(), 1);
        assert_eq!(cf.unref(), 0);

        assert!(cf.mark_destroyed());
        assert!(!cf.mark_destroyed());
    }

    #[test]
    fn test_background_error_keeps_first() {
        let cf = cfd();
        cf.set_background_error(Status::io_error("disk gone"));
        cf.set_background_error(Status::corruption("later"));
        assert!(cf.background_error().unwrap().is_io_error());
    }
}
