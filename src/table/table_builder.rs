use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crc32fast::Hasher;

use crate::{
    compression::{self, CompressionType},
    db::MAX_FIELD_SIZE,
    memtable::InternalKey,
    table::format::{Footer, encode_entry},
    util::{Result, Slice, Status},
};

/// Writes one table file
///
/// Entries must be added in internal key order. Nothing is visible on disk
/// under the final name until [`TableBuilder::finish`] has written and
/// synced the whole file.
pub struct TableBuilder {
    path: PathBuf,
    compression: CompressionType,
    body: Vec<u8>,
    last_key: Option<InternalKey>,
    smallest: Option<Slice>,
    num_entries: u64,
}

/// Result of a finished table build
#[derive(Debug, Clone)]
pub struct BuiltTable {
    pub file_size: u64,
    pub num_entries: u64,
    pub smallest: Slice,
    pub largest: Slice,
}

impl TableBuilder {
    pub fn new<P: AsRef<Path>>(path: P, compression: CompressionType) -> Self {
        TableBuilder {
            path: path.as_ref().to_path_buf(),
            compression,
            body: Vec::new(),
            last_key: None,
            smallest: None,
            num_entries: 0,
        }
    }

    pub fn add(&mut self, key: &InternalKey, value: &Slice) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last {
                return Err(Status::invalid_argument(
                    "Table entries must be added in sorted order",
                ));
            }
        }

        if key.user_key().size() > MAX_FIELD_SIZE || value.size() > MAX_FIELD_SIZE {
            return Err(Status::invalid_argument(
                "Table entry does not fit a 4-byte length prefix",
            ));
        }

        encode_entry(&mut self.body, key, value);
        if self.smallest.is_none() {
            self.smallest = Some(key.user_key().clone());
        }
        self.last_key = Some(key.clone());
        self.num_entries += 1;
        Ok(())
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Compress, write and fsync the file
    pub fn finish(self) -> Result<BuiltTable> {
        let (Some(smallest), Some(last_key)) = (self.smallest, self.last_key) else {
            return Err(Status::invalid_argument("Cannot build an empty table"));
        };

        let stored = compression::compress(self.compression, &self.body)?;
        let mut hasher = Hasher::new();
        hasher.update(&stored);
        let footer = Footer {
            num_entries: self.num_entries,
            raw_size: self.body.len() as u64,
            compression: self.compression,
            checksum: hasher.finalize(),
        };

        let tmp_path = self.path.with_extension("sst.tmp");
        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.write_all(&stored)?;
            file.write_all(&footer.encode())?;
            file.sync_all()
        };
        write(&tmp_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            Status::io_error(format!(
                "Failed to write table file {}: {e}",
                self.path.display()
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            Status::io_error(format!(
                "Failed to install table file {}: {e}",
                self.path.display()
            ))
        })?;
        if let Some(parent) = self.path.parent() {
            // Make the rename durable; some platforms cannot open directories.
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(BuiltTable {
            file_size: (stored.len() + crate::table::format::FOOTER_SIZE) as u64,
            num_entries: self.num_entries,
            smallest,
            largest: last_key.user_key().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::memtable::ValueType;

    #[test]
    fn test_rejects_unsorted_keys() {
        let dir = TempDir::new().unwrap();
        let mut builder = TableBuilder::new(dir.path().join("000001.sst"), CompressionType::None);

        builder
            .add(
                &InternalKey::new(Slice::from("b"), 1, ValueType::Value),
                &Slice::from("x"),
            )
            .unwrap();
        let err = builder
            .add(
                &InternalKey::new(Slice::from("a"), 2, ValueType::Value),
                &Slice::from("y"),
            )
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_finish_reports_key_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000001.sst");
        let mut builder = TableBuilder::new(&path, CompressionType::Snappy);
        for (i, key) in ["apple", "banana", "cherry"].iter().enumerate() {
            builder
                .add(
                    &InternalKey::new(Slice::from(*key), i as u64 + 1, ValueType::Value),
                    &Slice::from("v"),
                )
                .unwrap();
        }

        let built = builder.finish().unwrap();
        assert_eq!(built.num_entries, 3);
        assert_eq!(built.smallest, Slice::from("apple"));
        assert_eq!(built.largest, Slice::from("cherry"));
        assert_eq!(built.file_size, std::fs::metadata(&path).unwrap().len());
        assert!(!path.with_extension("sst.tmp").exists());
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let dir = TempDir::new().unwrap();
        let builder = TableBuilder::new(dir.path().join("000001.sst"), CompressionType::None);
        assert!(builder.finish().is_err());
    }
}
