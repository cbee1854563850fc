use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    util::{Result, Status},
    version::version_edit::{FileMetaData, VersionEdit},
    wal,
};

pub const MANIFEST_FILE_NAME: &str = "MANIFEST";
const MANIFEST_TEMP_FILE_NAME: &str = "MANIFEST.tmp";

/// Persisted state of one column family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFamilyRecord {
    pub id: u32,
    pub name: String,
    /// `ColumnFamilyOptions` as JSON
    pub options: String,
    /// Table files, newest first
    pub files: Vec<FileMetaData>,
    /// Every sequence at or below this is persisted in `files`
    pub flushed_sequence: u64,
}

/// Database state obtained by replaying every edit of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestState {
    /// Live column families by id; dropped ones are removed
    pub column_families: BTreeMap<u32, ColumnFamilyRecord>,
    pub next_file_number: u64,
    pub next_cf_id: u32,
    pub last_sequence: u64,
}

impl Default for ManifestState {
    fn default() -> Self {
        ManifestState {
            column_families: BTreeMap::new(),
            next_file_number: 1,
            next_cf_id: 0,
            last_sequence: 0,
        }
    }
}

impl ManifestState {
    pub fn apply(&mut self, edit: &VersionEdit) -> Result<()> {
        if let Some(num) = edit.next_file_number {
            self.next_file_number = self.next_file_number.max(num);
        }
        if let Some(id) = edit.next_cf_id {
            self.next_cf_id = self.next_cf_id.max(id);
        }
        if let Some(seq) = edit.last_sequence {
            self.last_sequence = self.last_sequence.max(seq);
        }

        for cf in &edit.created_column_families {
            if self.column_families.contains_key(&cf.id) {
                return Err(Status::corruption(format!(
                    "Column family id {} created twice",
                    cf.id
                )));
            }
            self.next_cf_id = self.next_cf_id.max(cf.id + 1);
            self.column_families.insert(
                cf.id,
                ColumnFamilyRecord {
                    id: cf.id,
                    name: cf.name.clone(),
                    options: cf.options.clone(),
                    files: Vec::new(),
                    flushed_sequence: 0,
                },
            );
        }

        // A flush racing a drop may log its file after the drop; such files
        // belong to nobody and are swept as orphans.
        for (cf_id, file) in &edit.new_files {
            if let Some(cf) = self.column_families.get_mut(cf_id) {
                cf.files.insert(0, file.clone());
            }
            self.next_file_number = self.next_file_number.max(file.number + 1);
        }
        for (cf_id, seq) in &edit.flushed_sequences {
            if let Some(cf) = self.column_families.get_mut(cf_id) {
                cf.flushed_sequence = cf.flushed_sequence.max(*seq);
            }
            self.last_sequence = self.last_sequence.max(*seq);
        }

        for cf_id in &edit.dropped_column_families {
            self.column_families.remove(cf_id);
        }

        Ok(())
    }

    /// One edit that recreates this whole state
    pub fn snapshot_edit(&self) -> VersionEdit {
        let mut edit = VersionEdit::new();
        edit.set_next_file_number(self.next_file_number);
        edit.set_next_cf_id(self.next_cf_id);
        edit.set_last_sequence(self.last_sequence);
        for cf in self.column_families.values() {
            edit.create_column_family(cf.id, cf.name.clone(), cf.options.clone());
            // Oldest first so that replay rebuilds the newest-first order.
            for file in cf.files.iter().rev() {
                edit.add_file(cf.id, file.clone());
            }
            edit.set_flushed_sequence(cf.id, cf.flushed_sequence);
        }
        edit
    }

    /// Names of the live column families, ordered by id
    pub fn column_family_names(&self) -> Vec<String> {
        self.column_families
            .values()
            .map(|cf| cf.name.clone())
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ColumnFamilyRecord> {
        self.column_families.values().find(|cf| cf.name == name)
    }

    /// Every table file number referenced by a live column family
    pub fn live_files(&self) -> impl std::iter::Iterator<Item = u64> + '_ {
        self.column_families
            .values()
            .flat_map(|cf| cf.files.iter().map(|f| f.number))
    }
}

/// Owns the MANIFEST file and the file number counter
///
/// Every [`VersionSet::log_and_apply`] appends exactly one record and syncs
/// it before returning, so an edit either survives a crash whole or not at
/// all. Edits are totally ordered by the writer lock. After a failed append
/// the next edit first rewrites the whole manifest from the last state that
/// was logged successfully.
pub struct VersionSet {
    db_path: PathBuf,
    /// `None` for read-only instances
    log: Mutex<Option<ManifestLog>>,
    next_file_number: AtomicU64,
}

struct ManifestLog {
    writer: wal::Writer,
    /// State after the last successfully logged edit
    state: ManifestState,
}

impl VersionSet {
    pub fn manifest_path(db_path: &Path) -> PathBuf {
        db_path.join(MANIFEST_FILE_NAME)
    }

    pub fn exists(db_path: &Path) -> bool {
        Self::manifest_path(db_path).exists()
    }

    /// Replay the manifest in `db_path`
    pub fn recover(db_path: &Path) -> Result<ManifestState> {
        let path = Self::manifest_path(db_path);
        let mut reader = wal::Reader::new(&path)?;
        let mut state = ManifestState::default();
        let mut records = 0usize;

        while let Some(record) = reader.read_record()? {
            let edit = VersionEdit::decode(&record)?;
            state.apply(&edit)?;
            records += 1;
        }
        debug!(
            records,
            column_families = state.column_families.len(),
            "recovered manifest"
        );

        Ok(state)
    }

    /// Write `state` as a fresh single-record manifest, atomically replacing
    /// any existing one, and keep it open for further edits.
    pub fn create(db_path: &Path, state: &ManifestState) -> Result<Self> {
        let writer = Self::write_snapshot(db_path, state)?;
        Ok(VersionSet {
            db_path: db_path.to_path_buf(),
            log: Mutex::new(Some(ManifestLog {
                writer,
                state: state.clone(),
            })),
            next_file_number: AtomicU64::new(state.next_file_number),
        })
    }

    fn write_snapshot(db_path: &Path, state: &ManifestState) -> Result<wal::Writer> {
        let tmp_path = db_path.join(MANIFEST_TEMP_FILE_NAME);
        match std::fs::remove_file(&tmp_path) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }

        let mut writer = wal::Writer::create(&tmp_path)?;
        writer.add_record(&state.snapshot_edit().encode())?;
        writer.sync()?;
        std::fs::rename(&tmp_path, Self::manifest_path(db_path))?;
        File::open(db_path)?.sync_all()?;
        Ok(writer)
    }

    /// A version set that refuses edits
    pub fn read_only(db_path: &Path, state: &ManifestState) -> Self {
        VersionSet {
            db_path: db_path.to_path_buf(),
            log: Mutex::new(None),
            next_file_number: AtomicU64::new(state.next_file_number),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Durably append `edit`. The current file number counter is recorded
    /// along with it.
    pub fn log_and_apply(&self, mut edit: VersionEdit) -> Result<()> {
        let mut guard = self.log.lock();
        let Some(log) = guard.as_mut() else {
            return Err(Status::not_supported("Manifest is read-only"));
        };

        if log.writer.is_failed() {
            let mut state = log.state.clone();
            state.next_file_number = state
                .next_file_number
                .max(self.next_file_number.load(Ordering::SeqCst));
            log.writer = Self::write_snapshot(&self.db_path, &state)?;
            warn!("rewrote MANIFEST after a failed write");
        }

        if edit.next_file_number.is_none() {
            edit.set_next_file_number(self.next_file_number.load(Ordering::SeqCst));
        }
        let mut next = log.state.clone();
        next.apply(&edit)?;

        let start = log.writer.add_record(&edit.encode())?;
        if let Err(e) = log.writer.sync() {
            log.writer.discard_from(start);
            return Err(e);
        }
        log.state = next;
        Ok(())
    }

    #[cfg(test)]
    fn writer(&self) -> parking_lot::MappedMutexGuard<'_, wal::Writer> {
        parking_lot::MutexGuard::map(self.log.lock(), |log| {
            &mut log.as_mut().expect("writable manifest").writer
        })
    }

    /// Allocate a new file number
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure no future allocation returns a number below `number`
    pub fn mark_file_number_used(&self, number: u64) {
        self.next_file_number.fetch_max(number + 1, Ordering::SeqCst);
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::util::Slice;

    fn file(number: u64) -> FileMetaData {
        FileMetaData::new(number, 4096, 3, Slice::from("a"), Slice::from("z"))
    }

    #[test]
    fn test_create_then_recover() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(0, "default".to_string(), "{}".to_string());
        state.apply(&edit).unwrap();

        let vset = VersionSet::create(temp_dir.path(), &state).unwrap();
        let mut edit = VersionEdit::new();
        edit.create_column_family(1, "users".to_string(), "{}".to_string());
        edit.set_next_cf_id(2);
        vset.log_and_apply(edit).unwrap();

        let mut edit = VersionEdit::new();
        edit.add_file(1, file(vset.new_file_number()));
        edit.set_flushed_sequence(1, 42);
        vset.log_and_apply(edit).unwrap();
        drop(vset);

        let recovered = VersionSet::recover(temp_dir.path()).unwrap();
        assert_eq!(recovered.column_family_names(), vec!["default", "users"]);
        assert_eq!(recovered.next_cf_id, 2);
        let users = recovered.find_by_name("users").unwrap();
        assert_eq!(users.files.len(), 1);
        assert_eq!(users.flushed_sequence, 42);
        assert_eq!(recovered.last_sequence, 42);
        assert!(recovered.next_file_number > users.files[0].number);
    }

    #[test]
    fn test_dropped_column_family_is_forgotten() {
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(0, "default".to_string(), "{}".to_string());
        edit.create_column_family(1, "tmp".to_string(), "{}".to_string());
        state.apply(&edit).unwrap();

        let mut edit = VersionEdit::new();
        edit.add_file(1, file(5));
        state.apply(&edit).unwrap();
        assert_eq!(state.live_files().collect::<Vec<_>>(), vec![5]);

        let mut edit = VersionEdit::new();
        edit.drop_column_family(1);
        state.apply(&edit).unwrap();

        assert_eq!(state.column_family_names(), vec!["default"]);
        assert_eq!(state.live_files().count(), 0);
        // Ids are never reused.
        assert_eq!(state.next_cf_id, 2);
    }

    #[test]
    fn test_compacted_rewrite_preserves_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(0, "default".to_string(), "{}".to_string());
        edit.add_file(0, file(3));
        edit.add_file(0, file(7));
        edit.set_flushed_sequence(0, 10);
        state.apply(&edit).unwrap();

        drop(VersionSet::create(temp_dir.path(), &state).unwrap());
        let first = VersionSet::recover(temp_dir.path()).unwrap();
        assert_eq!(first, state);
        assert_eq!(
            first.column_families[&0]
                .files
                .iter()
                .map(|f| f.number)
                .collect::<Vec<_>>(),
            vec![7, 3]
        );

        drop(VersionSet::create(temp_dir.path(), &first).unwrap());
        assert_eq!(VersionSet::recover(temp_dir.path()).unwrap(), state);
        assert!(!temp_dir.path().join(MANIFEST_TEMP_FILE_NAME).exists());
    }

    #[test]
    fn test_duplicate_create_is_corruption() {
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(3, "a".to_string(), "{}".to_string());
        state.apply(&edit).unwrap();
        assert!(state.apply(&edit).unwrap_err().is_corruption());
    }

    #[test]
    fn test_read_only_rejects_edits() {
        let temp_dir = TempDir::new().unwrap();
        let vset = VersionSet::read_only(temp_dir.path(), &ManifestState::default());
        assert!(
            vset.log_and_apply(VersionEdit::new())
                .unwrap_err()
                .is_not_supported()
        );
    }

    #[test]
    fn test_failed_edit_is_not_recovered() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(0, "default".to_string(), "{}".to_string());
        state.apply(&edit).unwrap();
        let vset = VersionSet::create(temp_dir.path(), &state).unwrap();

        {
            let mut writer = vset.writer();
            writer.faults().write_budget = Some(3);
            writer.faults().fail_truncate = true;
        }
        let mut edit = VersionEdit::new();
        edit.create_column_family(1, "lost".to_string(), "{}".to_string());
        assert!(vset.log_and_apply(edit).unwrap_err().is_io_error());

        // The next edit goes to a freshly written manifest.
        let mut edit = VersionEdit::new();
        edit.create_column_family(2, "kept".to_string(), "{}".to_string());
        edit.set_next_cf_id(3);
        vset.log_and_apply(edit).unwrap();
        drop(vset);

        let recovered = VersionSet::recover(temp_dir.path()).unwrap();
        assert_eq!(recovered.column_family_names(), vec!["default", "kept"]);
        assert_eq!(recovered.next_cf_id, 3);
    }

    #[test]
    fn test_invalid_edit_is_not_logged() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = ManifestState::default();
        let mut edit = VersionEdit::new();
        edit.create_column_family(0, "default".to_string(), "{}".to_string());
        state.apply(&edit).unwrap();
        let vset = VersionSet::create(temp_dir.path(), &state).unwrap();

        assert!(vset.log_and_apply(edit).unwrap_err().is_corruption());
        drop(vset);
        assert_eq!(VersionSet::recover(temp_dir.path()).unwrap(), state);
    }
}
