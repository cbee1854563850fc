use std::{path::Path, sync::Arc};

use tracing::warn;

use crate::{
    compression::CompressionType,
    iterator::{InternalIterator, TableIterator},
    memtable::MemTable,
    merge::GetContext,
    table::{TableBuilder, TableReader},
    util::{Result, Status, table_file_name},
    version::FileMetaData,
};

/// The table files of one column family, newest first
///
/// A set is immutable once built; flush produces a new set with the new file
/// in front, so readers holding the old set are unaffected.
#[derive(Clone, Default)]
pub struct TableFileSet {
    tables: Vec<(FileMetaData, Arc<TableReader>)>,
}

impl TableFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every file listed in `files` (newest first)
    pub fn load(dir: &Path, files: &[FileMetaData]) -> Result<Self> {
        let mut tables = Vec::with_capacity(files.len());
        for meta in files {
            let reader = TableReader::open(dir.join(table_file_name(meta.number)), meta.number)?;
            tables.push((meta.clone(), Arc::new(reader)));
        }
        Ok(TableFileSet { tables })
    }

    /// Write the whole content of `mem` into table file `number`
    pub fn persist(
        dir: &Path,
        number: u64,
        mem: &MemTable,
        compression: CompressionType,
    ) -> Result<(FileMetaData, Arc<TableReader>)> {
        if mem.is_empty() {
            return Err(Status::invalid_argument("Cannot persist an empty memtable"));
        }

        let path = dir.join(table_file_name(number));
        let mut builder = TableBuilder::new(&path, compression);
        for (key, value) in mem.entries() {
            builder.add(&key, &value)?;
        }
        let built = builder.finish()?;

        let reader = TableReader::open(&path, number)?;
        let meta = FileMetaData::new(
            number,
            built.file_size,
            built.num_entries,
            built.smallest,
            built.largest,
        );
        Ok((meta, Arc::new(reader)))
    }

    /// A new set with `table` as the newest file
    pub fn with_table(&self, meta: FileMetaData, reader: Arc<TableReader>) -> Self {
        let mut tables = Vec::with_capacity(self.tables.len() + 1);
        tables.push((meta, reader));
        tables.extend(self.tables.iter().cloned());
        TableFileSet { tables }
    }

    /// Feed the versions of `ctx.key()` visible at `snapshot` from the
    /// newest file to the oldest. Returns `true` once the lookup is complete.
    pub fn lookup(&self, ctx: &mut GetContext<'_>, snapshot: u64) -> bool {
        for (meta, reader) in &self.tables {
            let key = ctx.key();
            if key < &meta.smallest || key > &meta.largest {
                continue;
            }
            if reader.get(ctx, snapshot) {
                return true;
            }
        }
        false
    }

    /// One iterator per file, newest first
    pub fn iterators(&self) -> Vec<Box<dyn InternalIterator>> {
        self.tables
            .iter()
            .map(|(_, reader)| Box::new(TableIterator::new(reader.clone())) as Box<dyn InternalIterator>)
            .collect()
    }

    pub fn files(&self) -> Vec<FileMetaData> {
        self.tables.iter().map(|(meta, _)| meta.clone()).collect()
    }

    pub fn file_numbers(&self) -> Vec<u64> {
        self.tables.iter().map(|(meta, _)| meta.number).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.tables.iter().map(|(meta, _)| meta.file_size).sum()
    }

    /// Remove every file of this set from disk. Failures are logged and
    /// left for the orphan sweep of the next open.
    pub fn delete_files(&self, dir: &Path) -> usize {
        let mut deleted = 0;
        for number in self.file_numbers() {
            match std::fs::remove_file(dir.join(table_file_name(number))) {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => warn!(file = number, error = %e, "failed to delete table file"),
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{memtable::ValueType, util::Slice};

    fn get(set: &TableFileSet, key: &str, snapshot: u64) -> Option<Slice> {
        let mut ctx = GetContext::new(Slice::from(key), None);
        set.lookup(&mut ctx, snapshot);
        ctx.finish().unwrap()
    }

    #[test]
    fn test_newer_file_shadows_older() {
        let dir = TempDir::new().unwrap();

        let first = MemTable::new();
        first.add(1, ValueType::Value, Slice::from("k"), Slice::from("old"));
        first.add(2, ValueType::Value, Slice::from("other"), Slice::from("x"));
        let (meta, reader) =
            TableFileSet::persist(dir.path(), 5, &first, CompressionType::Snappy).unwrap();
        let set = TableFileSet::new().with_table(meta, reader);

        let second = MemTable::new();
        second.add(3, ValueType::Value, Slice::from("k"), Slice::from("new"));
        let (meta, reader) =
            TableFileSet::persist(dir.path(), 8, &second, CompressionType::None).unwrap();
        let newer = set.with_table(meta, reader);

        assert_eq!(set.len(), 1);
        assert_eq!(newer.file_numbers(), vec![8, 5]);
        assert_eq!(get(&newer, "k", u64::MAX), Some(Slice::from("new")));
        assert_eq!(get(&newer, "k", 2), Some(Slice::from("old")));
        assert_eq!(get(&newer, "other", u64::MAX), Some(Slice::from("x")));
        assert_eq!(get(&newer, "missing", u64::MAX), None);
    }

    #[test]
    fn test_load_and_delete() {
        let dir = TempDir::new().unwrap();
        let mem = MemTable::new();
        mem.add(1, ValueType::Value, Slice::from("a"), Slice::from("1"));
        let (meta, _) = TableFileSet::persist(dir.path(), 3, &mem, CompressionType::Lz4).unwrap();
        assert_eq!(meta.smallest, Slice::from("a"));

        let set = TableFileSet::load(dir.path(), &[meta.clone()]).unwrap();
        assert_eq!(set.files(), vec![meta]);
        assert_eq!(get(&set, "a", u64::MAX), Some(Slice::from("1")));

        assert_eq!(set.delete_files(dir.path()), 1);
        assert!(!dir.path().join(table_file_name(3)).exists());
    }

    #[test]
    fn test_persist_rejects_empty_memtable() {
        let dir = TempDir::new().unwrap();
        let result = TableFileSet::persist(dir.path(), 1, &MemTable::new(), CompressionType::None);
        assert!(result.unwrap_err().is_invalid_argument());
    }
}
