use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::{
    column_family::{
        ColumnFamilyData, ColumnFamilyDescriptor, ColumnFamilyHandle, ColumnFamilyOptions,
        ColumnFamilySet, DEFAULT_COLUMN_FAMILY_NAME,
    },
    db::{DBOptions, ReadOptions, Snapshot, SnapshotList, WriteBatch, WriteOp, WriteOptions},
    iterator::{DBIterator, MergingIterator},
    memtable::MemTable,
    merge::GetContext,
    statistics::Statistics,
    table::TableFileSet,
    util::{FileType, Result, Slice, Status, parse_file_name},
    version::{ManifestState, VersionEdit, VersionSet},
    wal::{LogSegment, WalManager},
};

/// Default WAL size limit per byte of memtable budget
const WAL_SIZE_PER_MEMTABLE_BUDGET: u64 = 4;

/// An embedded key-value store partitioned into column families
///
/// All column families share one WAL and one sequence number space:
///
/// ```text
///            write(batch)
///                 │
///      ┌──────────▼──────────┐
///      │ WAL (one record per │  ← commit point, sequences assigned here
///      │ batch, segmented)   │
///      └──────────┬──────────┘
///        ┌────────┼────────┐
///        ▼        ▼        ▼
///     default   users    posts     ← per-CF memtables, flushed to tables
/// ```
///
/// A WAL segment is deleted only when every live column family has flushed
/// all of its data up to the segment's last sequence.
pub struct DB {
    /// Database directory path
    db_path: PathBuf,
    /// Global database options
    options: DBOptions,
    read_only: bool,
    /// Manages all column families
    column_families: Arc<ColumnFamilySet>,
    /// MANIFEST and file number allocation
    versions: VersionSet,
    /// Write-ahead log (shared across all CFs). Holding this lock orders
    /// every write and every memtable switch.
    wal: Mutex<WalManager>,
    /// Sequence of the newest write visible to readers
    last_sequence: AtomicU64,
    snapshots: SnapshotList,
    /// Database-wide statistics
    statistics: Arc<Statistics>,
    default_cf: ColumnFamilyHandle,
}

impl DB {
    /// Open a database holding only the `default` column family
    ///
    /// Fails with `InvalidArgument` when the database has other column
    /// families; use [`DB::open_cf`] for those.
    pub fn open(options: DBOptions, path: impl AsRef<Path>) -> Result<Self> {
        let descriptor =
            ColumnFamilyDescriptor::new(DEFAULT_COLUMN_FAMILY_NAME, options.default_cf_options.clone());
        let (db, _handles) = Self::open_internal(options, path.as_ref(), vec![descriptor], false)?;
        Ok(db)
    }

    /// Open a database with exactly the column families in `descriptors`
    ///
    /// Returns one handle per descriptor, in the same order. Column families
    /// recorded on disk but not listed are an error, and so are listed ones
    /// missing from disk unless `create_missing_column_families` is set.
    pub fn open_cf(
        options: DBOptions,
        path: impl AsRef<Path>,
        descriptors: Vec<ColumnFamilyDescriptor>,
    ) -> Result<(Self, Vec<ColumnFamilyHandle>)> {
        Self::open_internal(options, path.as_ref(), descriptors, false)
    }

    /// Open an existing database without modifying anything on disk
    ///
    /// `descriptors` may name any subset of the recorded column families;
    /// it must include `default`.
    pub fn open_cf_for_read_only(
        options: DBOptions,
        path: impl AsRef<Path>,
        descriptors: Vec<ColumnFamilyDescriptor>,
    ) -> Result<(Self, Vec<ColumnFamilyHandle>)> {
        Self::open_internal(options, path.as_ref(), descriptors, true)
    }

    /// Names of the column families recorded in the database at `path`
    pub fn list_column_families(_options: &DBOptions, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        if !VersionSet::exists(path) {
            return Err(Status::not_found(format!(
                "No database at {}",
                path.display()
            )));
        }
        Ok(VersionSet::recover(path)?.column_family_names())
    }

    fn open_internal(
        options: DBOptions,
        db_path: &Path,
        descriptors: Vec<ColumnFamilyDescriptor>,
        read_only: bool,
    ) -> Result<(Self, Vec<ColumnFamilyHandle>)> {
        validate_descriptors(&descriptors)?;

        let exists = VersionSet::exists(db_path);
        if exists && options.error_if_exists {
            return Err(Status::invalid_argument(format!(
                "Database already exists: {}",
                db_path.display()
            )));
        }
        if !exists && (read_only || !options.create_if_missing) {
            return Err(Status::invalid_argument(format!(
                "Database does not exist: {}",
                db_path.display()
            )));
        }
        if !exists {
            fs::create_dir_all(db_path)
                .map_err(|e| Status::io_error(format!("Failed to create directory: {e}")))?;
        }

        let mut state = if exists {
            VersionSet::recover(db_path)?
        } else {
            fresh_state(&descriptors)?
        };

        // Match the descriptors against what is on disk
        let recorded: HashSet<&str> = state
            .column_families
            .values()
            .map(|cf| cf.name.as_str())
            .collect();
        let requested: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        if !read_only {
            if let Some(name) = recorded.iter().find(|name| !requested.contains(*name)) {
                return Err(Status::invalid_argument(format!(
                    "Column family '{name}' exists but was not opened"
                )));
            }
        }
        let missing: Vec<ColumnFamilyDescriptor> = descriptors
            .iter()
            .filter(|d| !recorded.contains(d.name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() && (read_only || !options.create_missing_column_families) {
            return Err(Status::invalid_argument(format!(
                "Column family '{}' does not exist",
                missing[0].name
            )));
        }

        // Rebuild the opened column families from their records
        let statistics = Arc::new(Statistics::new());
        let column_families = Arc::new(ColumnFamilySet::new(
            db_path,
            state.next_cf_id,
            statistics.clone(),
        ));
        for descriptor in &descriptors {
            let Some(record) = state
                .column_families
                .values_mut()
                .find(|cf| cf.name == descriptor.name)
            else {
                continue;
            };
            let tables = TableFileSet::load(db_path, &record.files)?;
            if !read_only {
                record.options = descriptor.options.to_json()?;
            }
            column_families.insert(Arc::new(ColumnFamilyData::new(
                record.id,
                record.name.clone(),
                descriptor.options.clone(),
                tables,
                record.flushed_sequence,
            )));
        }

        let mut max_sequence = state.last_sequence;
        let segments = WalManager::replay(db_path, |record| {
            replay_batch(record, &column_families, &mut max_sequence)
        })?;
        let last_sequence = max_sequence;

        let (versions, wal) = if read_only {
            (
                VersionSet::read_only(db_path, &state),
                WalManager::read_only(db_path, segments),
            )
        } else {
            state.last_sequence = last_sequence;
            state.next_file_number = state
                .next_file_number
                .max(max_file_number(db_path)? + 1);
            let versions = VersionSet::create(db_path, &state)?;
            let wal = WalManager::open(
                db_path,
                segments,
                versions.new_file_number(),
                options.max_log_file_size,
            )?;
            statistics.record_wal_segment_created();
            remove_orphans(db_path, &state)?;
            (versions, wal)
        };

        let default_cf = column_families
            .find_by_name(DEFAULT_COLUMN_FAMILY_NAME)
            .map(|cfd| column_families.handle(cfd))
            .ok_or_else(|| Status::corruption("Default column family is missing"))?;

        let db = DB {
            db_path: db_path.to_path_buf(),
            options,
            read_only,
            column_families,
            versions,
            wal: Mutex::new(wal),
            last_sequence: AtomicU64::new(last_sequence),
            snapshots: SnapshotList::default(),
            statistics,
            default_cf,
        };

        for descriptor in missing {
            db.column_families.create(descriptor, &db.versions)?;
        }
        let handles = descriptors
            .iter()
            .map(|d| {
                db.column_families
                    .find_by_name(&d.name)
                    .map(|cfd| db.column_families.handle(cfd))
                    .ok_or_else(|| Status::corruption(format!("Column family '{}' vanished", d.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        if !read_only {
            db.retire_obsolete_wal();
            for cfd in db.column_families.live() {
                if cfd.should_flush() {
                    db.flush_cfd(&cfd)?;
                }
            }
        }

        info!(
            path = %db.db_path.display(),
            read_only,
            column_families = handles.len(),
            last_sequence,
            "opened database"
        );
        Ok((db, handles))
    }

    /// Apply every operation of `batch` atomically
    ///
    /// The batch is committed once its WAL record is appended; the write
    /// then returns `Ok` even if a follow-up flush fails.
    pub fn write(&self, options: &WriteOptions, batch: WriteBatch) -> Result<()> {
        if self.read_only {
            return Err(Status::not_supported("Database is opened read-only"));
        }
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let targets = self.resolve_for_write(&batch)?;
        let count = batch.count() as u64;

        {
            let mut wal = self.wal.lock();
            if wal.is_failed() {
                let number = self.versions.new_file_number();
                wal.roll(number)?;
                info!(segment = number, "replaced failed WAL segment");
                self.statistics.record_wal_segment_created();
            }

            let base = self.last_sequence.load(Ordering::Acquire) + 1;
            let last = base + count - 1;
            let record = batch.encode(base);
            if let Err(e) = wal.append(base, last, &record, options.sync) {
                self.statistics.record_error();
                if wal.is_failed() {
                    // The record may have reached the segment; its sequences
                    // are never handed out again.
                    self.last_sequence.store(last, Ordering::Release);
                    error!(error = %e, first = base, last, "WAL append failed, segment abandoned");
                }
                return Err(e);
            }

            for (i, ((_, op), cfd)) in batch.ops().iter().zip(&targets).enumerate() {
                cfd.apply(base + i as u64, op);
            }
            self.last_sequence.store(last, Ordering::Release);
            self.statistics
                .record_wal_write(record.len() as u64, options.sync);

            if wal.needs_rollover() {
                let number = self.versions.new_file_number();
                match wal.roll(number) {
                    Ok(()) => self.statistics.record_wal_segment_created(),
                    Err(e) => {
                        warn!(error = %e, "failed to roll WAL segment");
                        self.statistics.record_error();
                    },
                }
            }
        }

        let (mut puts, mut deletes, mut merges) = (0, 0, 0);
        for (_, op) in batch.ops() {
            match op {
                WriteOp::Put { .. } => puts += 1,
                WriteOp::Delete { .. } => deletes += 1,
                WriteOp::Merge { .. } => merges += 1,
            }
        }
        self.statistics
            .record_batch(puts, deletes, merges, batch.data_size() as u64);

        self.maybe_flush(&targets);
        self.enforce_wal_ceiling();
        Ok(())
    }

    /// Look up the column family of every operation and check it accepts
    /// writes
    fn resolve_for_write(&self, batch: &WriteBatch) -> Result<Vec<Arc<ColumnFamilyData>>> {
        let mut targets: Vec<Arc<ColumnFamilyData>> = Vec::with_capacity(batch.count());
        for (cf_id, op) in batch.ops() {
            let cfd = match targets.last() {
                Some(prev) if prev.id() == *cf_id => prev.clone(),
                _ => self.writable_column_family(*cf_id)?,
            };
            if matches!(op, WriteOp::Merge { .. }) && cfd.options().merge_operator.is_none() {
                return Err(Status::invalid_argument(format!(
                    "Column family '{}' has no merge operator",
                    cfd.name()
                )));
            }
            targets.push(cfd);
        }
        Ok(targets)
    }

    fn writable_column_family(&self, id: u32) -> Result<Arc<ColumnFamilyData>> {
        match self.column_families.get(id) {
            Some(cfd) if cfd.is_dropped() => Err(Status::column_family_dropped(format!(
                "Column family '{}' is dropped",
                cfd.name()
            ))),
            Some(cfd) => match cfd.background_error() {
                Some(e) => Err(e),
                None => Ok(cfd),
            },
            None if id < self.column_families.next_id() => Err(Status::column_family_dropped(
                format!("Column family {id} no longer exists"),
            )),
            None => Err(Status::invalid_argument(format!(
                "Unknown column family id {id}"
            ))),
        }
    }

    pub fn put(
        &self,
        options: &WriteOptions,
        key: impl Into<Slice>,
        value: impl Into<Slice>,
    ) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.put(key, value);
        self.write(options, batch)
    }

    pub fn put_cf(
        &self,
        options: &WriteOptions,
        cf: &ColumnFamilyHandle,
        key: impl Into<Slice>,
        value: impl Into<Slice>,
    ) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.put_cf(cf, key, value);
        self.write(options, batch)
    }

    pub fn delete(&self, options: &WriteOptions, key: impl Into<Slice>) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.delete(key);
        self.write(options, batch)
    }

    pub fn delete_cf(
        &self,
        options: &WriteOptions,
        cf: &ColumnFamilyHandle,
        key: impl Into<Slice>,
    ) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.delete_cf(cf, key);
        self.write(options, batch)
    }

    pub fn merge(
        &self,
        options: &WriteOptions,
        key: impl Into<Slice>,
        operand: impl Into<Slice>,
    ) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.merge(key, operand);
        self.write(options, batch)
    }

    pub fn merge_cf(
        &self,
        options: &WriteOptions,
        cf: &ColumnFamilyHandle,
        key: impl Into<Slice>,
        operand: impl Into<Slice>,
    ) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.merge_cf(cf, key, operand);
        self.write(options, batch)
    }

    pub fn get(&self, options: &ReadOptions, key: impl Into<Slice>) -> Result<Option<Slice>> {
        self.get_cf(options, &self.default_cf, key)
    }

    /// Read `key` from `cf` as of the snapshot in `options`, or the latest
    /// state
    ///
    /// Works on dropped column families until they are destroyed.
    pub fn get_cf(
        &self,
        options: &ReadOptions,
        cf: &ColumnFamilyHandle,
        key: impl Into<Slice>,
    ) -> Result<Option<Slice>> {
        let sequence = self.read_sequence(options);
        let cfd = cf.cfd();
        let sv = cfd.super_version();

        let mut ctx = GetContext::new(key.into(), cfd.options().merge_operator.as_deref());
        sv.get(&mut ctx, sequence);
        let value = ctx.finish()?;
        self.statistics.record_read(value.is_some());
        Ok(value)
    }

    fn read_sequence(&self, options: &ReadOptions) -> u64 {
        match &options.snapshot {
            Some(snapshot) => snapshot.sequence(),
            None => self.last_sequence.load(Ordering::Acquire),
        }
    }

    /// Iterate the default column family
    pub fn iter(&self, options: &ReadOptions) -> Result<DBIterator> {
        self.iter_cf(options, &self.default_cf)
    }

    pub fn iter_cf(&self, options: &ReadOptions, cf: &ColumnFamilyHandle) -> Result<DBIterator> {
        self.new_iterators(options, &[cf])?
            .pop()
            .ok_or_else(|| Status::invalid_argument("No column family to iterate"))
    }

    /// One iterator per handle, all reading at the same sequence number
    ///
    /// Uses the snapshot in `options` when set; otherwise takes a new one
    /// before pinning any column family.
    pub fn new_iterators(
        &self,
        options: &ReadOptions,
        cfs: &[&ColumnFamilyHandle],
    ) -> Result<Vec<DBIterator>> {
        let snapshot = match &options.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => self.snapshot(),
        };

        Ok(cfs
            .iter()
            .map(|cf| {
                let cfd = cf.cfd();
                let sv = cfd.super_version();
                self.statistics.record_iterator();
                DBIterator::new(
                    MergingIterator::new(sv.iterators()),
                    snapshot.clone(),
                    cfd.options().merge_operator.clone(),
                )
            })
            .collect())
    }

    /// Capture the current state of every column family
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots
            .create(self.last_sequence.load(Ordering::Acquire))
    }

    /// Number of snapshots still held by callers
    pub fn num_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Sequence of the oldest snapshot still held
    pub fn oldest_snapshot_sequence(&self) -> Option<u64> {
        self.snapshots.oldest()
    }

    pub fn create_column_family(
        &self,
        name: impl Into<String>,
        options: ColumnFamilyOptions,
    ) -> Result<ColumnFamilyHandle> {
        if self.read_only {
            return Err(Status::not_supported("Database is opened read-only"));
        }
        self.column_families
            .create(ColumnFamilyDescriptor::new(name, options), &self.versions)
    }

    /// Drop the column family behind `cf`
    ///
    /// Existing handles keep reading its data; it is destroyed when the last
    /// handle is released.
    pub fn drop_column_family(&self, cf: &ColumnFamilyHandle) -> Result<()> {
        if self.read_only {
            return Err(Status::not_supported("Database is opened read-only"));
        }
        self.column_families.drop_column_family(cf, &self.versions)?;
        // Its unflushed data no longer holds WAL segments.
        self.retire_obsolete_wal();
        Ok(())
    }

    /// A new handle to the live column family called `name`
    pub fn column_family_handle(&self, name: &str) -> Option<ColumnFamilyHandle> {
        let cfd = self.column_families.find_by_name(name)?;
        if cfd.is_dropped() {
            return None;
        }
        Some(self.column_families.handle(cfd))
    }

    pub fn default_column_family(&self) -> ColumnFamilyHandle {
        self.default_cf.clone()
    }

    /// Names of every column family not yet destroyed, ordered by id
    ///
    /// Includes dropped column families that still have handles.
    pub fn list_live_column_families(&self) -> Vec<String> {
        self.column_families.list()
    }

    /// Flush the memtables of `cf` into a table file
    pub fn flush_cf(&self, cf: &ColumnFamilyHandle) -> Result<()> {
        self.flush_cfd(cf.cfd())
    }

    /// Flush several column families in parallel
    pub fn flush(&self, cfs: &[&ColumnFamilyHandle]) -> Result<()> {
        cfs.par_iter()
            .map(|cf| self.flush_cfd(cf.cfd()))
            .collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    fn flush_cfd(&self, cfd: &Arc<ColumnFamilyData>) -> Result<()> {
        if self.read_only {
            return Err(Status::not_supported("Database is opened read-only"));
        }
        if let Some(e) = cfd.background_error() {
            return Err(e);
        }

        let _flush = cfd.flush_lock().lock();
        if cfd.is_dropped() {
            return Ok(());
        }

        {
            let mut wal = self.wal.lock();
            if cfd.switch_memtable() {
                // The switched memtable's records stay in the sealed
                // segment; failing to roll only delays retirement.
                let number = self.versions.new_file_number();
                match wal.roll(number) {
                    Ok(()) => self.statistics.record_wal_segment_created(),
                    Err(e) => {
                        warn!(cf = cfd.name(), error = %e, "failed to roll WAL segment on flush");
                        self.statistics.record_error();
                    },
                }
            }
        }

        while let Some(imm) = cfd.oldest_immutable() {
            self.flush_memtable(cfd, &imm)?;
        }

        self.retire_obsolete_wal();
        Ok(())
    }

    /// Persist `imm`, record it in the manifest, then make it visible
    fn flush_memtable(&self, cfd: &Arc<ColumnFamilyData>, imm: &Arc<MemTable>) -> Result<()> {
        let number = self.versions.new_file_number();
        let mut backoff = self.options.flush_retry_backoff;
        let mut retries = 0;

        let (meta, reader) = loop {
            match TableFileSet::persist(
                &self.db_path,
                number,
                imm,
                cfd.options().compression_type,
            ) {
                Ok(built) => break built,
                Err(e) if retries < self.options.flush_retry_attempts => {
                    retries += 1;
                    warn!(
                        cf = cfd.name(),
                        attempt = retries,
                        backoff = ?backoff,
                        error = %e,
                        "flush failed, retrying"
                    );
                    self.statistics.record_flush_retry();
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                },
                Err(e) => return Err(self.fail_flush(cfd, e)),
            }
        };

        let flushed = imm.last_sequence().unwrap_or_default();
        let mut edit = VersionEdit::new();
        edit.add_file(cfd.id(), meta.clone());
        edit.set_flushed_sequence(cfd.id(), flushed);
        edit.set_last_sequence(self.last_sequence.load(Ordering::Acquire));
        if let Err(e) = self.versions.log_and_apply(edit) {
            return Err(self.fail_flush(cfd, e));
        }

        debug!(
            cf = cfd.name(),
            file = number,
            entries = meta.num_entries,
            size = meta.file_size,
            flushed_sequence = flushed,
            "flushed memtable"
        );
        self.statistics
            .record_memtable_flush(imm.approximate_memory_usage() as u64);
        cfd.install_flush_result(imm, meta, reader, flushed);
        Ok(())
    }

    fn fail_flush(&self, cfd: &ColumnFamilyData, e: Status) -> Status {
        error!(
            cf = cfd.name(),
            error = %e,
            "flush failed for good, column family stops accepting writes"
        );
        self.statistics.record_error();
        cfd.set_background_error(e.clone());
        e
    }

    fn maybe_flush(&self, targets: &[Arc<ColumnFamilyData>]) {
        let mut seen = HashSet::new();
        for cfd in targets {
            if !seen.insert(cfd.id()) || !cfd.should_flush() {
                continue;
            }
            if let Err(e) = self.flush_cfd(cfd) {
                warn!(cf = cfd.name(), error = %e, "automatic flush failed");
            }
        }
    }

    /// Force-flush the column families pinning the oldest WAL segment while
    /// the WAL is over [`DB::max_total_wal_size`]
    fn enforce_wal_ceiling(&self) {
        let ceiling = self.max_total_wal_size();

        let (total, bound) = {
            let wal = self.wal.lock();
            (wal.total_size(), wal.oldest_live_sequence_bound())
        };
        let Some(bound) = bound else {
            return;
        };
        if total <= ceiling {
            return;
        }

        let mut pinning: Vec<(u64, Arc<ColumnFamilyData>)> = self
            .column_families
            .live()
            .into_iter()
            .filter_map(|cfd| {
                cfd.oldest_unflushed_sequence()
                    .filter(|seq| *seq <= bound)
                    .map(|seq| (seq, cfd))
            })
            .collect();
        pinning.sort_by_key(|(seq, _)| *seq);

        for (_, cfd) in pinning {
            debug!(cf = cfd.name(), total, ceiling, "WAL over size limit, forcing flush");
            self.statistics.record_forced_flush();
            if let Err(e) = self.flush_cfd(&cfd) {
                warn!(cf = cfd.name(), error = %e, "forced flush failed");
            }
        }
    }

    /// Size limit of all WAL segments together
    ///
    /// `DBOptions::max_total_wal_size`, or when that is 0, four times the
    /// memtable budget of the live column families.
    pub fn max_total_wal_size(&self) -> u64 {
        match self.options.max_total_wal_size {
            0 => self
                .column_families
                .live()
                .iter()
                .map(|cfd| cfd.options().write_buffer_size as u64)
                .sum::<u64>()
                .saturating_mul(WAL_SIZE_PER_MEMTABLE_BUDGET),
            limit => limit,
        }
    }

    /// Delete WAL segments no live column family needs for recovery
    fn retire_obsolete_wal(&self) {
        if self.read_only {
            return;
        }
        let mut wal = self.wal.lock();
        let watermark = self
            .column_families
            .min_unflushed_sequence(self.last_sequence.load(Ordering::Acquire));
        let retired = wal.retire(watermark);
        if !retired.is_empty() {
            self.statistics
                .record_wal_segments_retired(retired.len() as u64);
        }
    }

    /// Sequence number of the newest committed write
    pub fn latest_sequence_number(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Current WAL segments, oldest first; the last one is active
    pub fn wal_segments(&self) -> Vec<LogSegment> {
        self.wal.lock().segments()
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Sync the WAL and close the database
    pub fn close(self) -> Result<()> {
        self.wal.lock().sync()?;
        info!(path = %self.db_path.display(), "closed database");
        Ok(())
    }
}

impl fmt::Debug for DB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DB")
            .field("path", &self.db_path)
            .field("read_only", &self.read_only)
            .field("column_families", &self.column_families.list())
            .field("last_sequence", &self.latest_sequence_number())
            .finish()
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        if let Err(e) = self.wal.lock().sync() {
            warn!(error = %e, "failed to sync WAL on drop");
        }
    }
}

fn validate_descriptors(descriptors: &[ColumnFamilyDescriptor]) -> Result<()> {
    let mut names = HashSet::new();
    for descriptor in descriptors {
        descriptor.validate()?;
        if !names.insert(descriptor.name.as_str()) {
            return Err(Status::invalid_argument(format!(
                "Column family '{}' given twice",
                descriptor.name
            )));
        }
    }
    if !names.contains(DEFAULT_COLUMN_FAMILY_NAME) {
        return Err(Status::invalid_argument(
            "Default column family must be specified",
        ));
    }
    Ok(())
}

/// State of a brand-new database: only `default`, with id 0
fn fresh_state(descriptors: &[ColumnFamilyDescriptor]) -> Result<ManifestState> {
    let options = descriptors
        .iter()
        .find(|d| d.name == DEFAULT_COLUMN_FAMILY_NAME)
        .map(|d| d.options.to_json())
        .transpose()?
        .unwrap_or_default();

    let mut edit = VersionEdit::new();
    edit.create_column_family(0, DEFAULT_COLUMN_FAMILY_NAME.to_string(), options);
    edit.set_next_cf_id(1);

    let mut state = ManifestState::default();
    state.apply(&edit)?;
    Ok(state)
}

/// Re-apply one WAL record. Operations already flushed, or aimed at column
/// families that are gone or not opened, are skipped.
fn replay_batch(
    record: &[u8],
    column_families: &ColumnFamilySet,
    max_sequence: &mut u64,
) -> Result<(u64, u64)> {
    let (base, batch) = WriteBatch::decode(record)?;
    if batch.is_empty() {
        return Err(Status::corruption("Empty write batch in WAL"));
    }
    let last = base + batch.count() as u64 - 1;

    for (i, (cf_id, op)) in batch.ops().iter().enumerate() {
        let sequence = base + i as u64;
        if let Some(cfd) = column_families.get(*cf_id) {
            if sequence > cfd.flushed_sequence() {
                cfd.apply(sequence, op);
            }
        }
    }

    *max_sequence = (*max_sequence).max(last);
    Ok((base, last))
}

/// Highest log or table file number in `dir`, 0 if none
fn max_file_number(dir: &Path) -> Result<u64> {
    let mut max = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        match entry.file_name().to_str().and_then(parse_file_name) {
            Some(FileType::Log(n)) | Some(FileType::Table(n)) => max = max.max(n),
            None => {},
        }
    }
    Ok(max)
}

/// Delete table files no column family references, and unfinished ones
fn remove_orphans(dir: &Path, state: &ManifestState) -> Result<()> {
    let live: HashSet<u64> = state.live_files().collect();
    let mut removed = 0usize;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let orphan = match parse_file_name(name) {
            Some(FileType::Table(n)) => !live.contains(&n),
            _ => name.ends_with(".sst.tmp"),
        };
        if !orphan {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(file = name, error = %e, "failed to delete orphan table file"),
        }
    }

    if removed > 0 {
        info!(files = removed, "deleted orphan table files");
    }
    Ok(())
}
