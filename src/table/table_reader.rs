use std::path::Path;

use bytes::Bytes;
use crc32fast::Hasher;

use crate::{
    compression,
    memtable::InternalKey,
    merge::GetContext,
    table::format::{FOOTER_SIZE, Footer, decode_entry},
    util::{Result, Slice, Status},
};

/// An opened table file
///
/// The whole file is read and verified once at open time; lookups and
/// iteration then run against the decoded entries.
pub struct TableReader {
    number: u64,
    file_size: u64,
    entries: Vec<(InternalKey, Slice)>,
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("number", &self.number)
            .field("file_size", &self.file_size)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl TableReader {
    pub fn open<P: AsRef<Path>>(path: P, number: u64) -> Result<Self> {
        let data = std::fs::read(path.as_ref()).map_err(|e| {
            Status::io_error(format!(
                "Failed to read table file {}: {e}",
                path.as_ref().display()
            ))
        })?;

        if data.len() < FOOTER_SIZE {
            return Err(Status::corruption(format!(
                "Table file {number} too small"
            )));
        }

        let (stored, footer_data) = data.split_at(data.len() - FOOTER_SIZE);
        let footer = Footer::decode(footer_data)?;

        let mut hasher = Hasher::new();
        hasher.update(stored);
        if hasher.finalize() != footer.checksum {
            return Err(Status::corruption(format!(
                "Table file {number} checksum mismatch"
            )));
        }

        let body = Bytes::from(compression::decompress(footer.compression, stored)?);
        if body.len() as u64 != footer.raw_size {
            return Err(Status::corruption(format!(
                "Table file {number} body size mismatch"
            )));
        }

        let mut entries = Vec::with_capacity(footer.num_entries as usize);
        let mut pos = 0;
        while pos < body.len() {
            entries.push(decode_entry(&body, &mut pos)?);
        }
        if entries.len() as u64 != footer.num_entries {
            return Err(Status::corruption(format!(
                "Table file {number} entry count mismatch"
            )));
        }

        Ok(TableReader {
            number,
            file_size: data.len() as u64,
            entries,
        })
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Index of the first entry at or after `target`
    pub fn seek_index(&self, target: &InternalKey) -> usize {
        self.entries.partition_point(|(k, _)| k < target)
    }

    pub fn entries(&self) -> &[(InternalKey, Slice)] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&(InternalKey, Slice)> {
        self.entries.get(index)
    }

    /// Same contract as [`crate::memtable::MemTable::get`]
    pub fn get(&self, ctx: &mut GetContext<'_>, snapshot: u64) -> bool {
        let start = InternalKey::seek_key(ctx.key().clone(), snapshot);

        for (key, value) in &self.entries[self.seek_index(&start)..] {
            if key.user_key() != ctx.key() {
                break;
            }
            if ctx.save_value(key.value_type(), value) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{compression::CompressionType, memtable::ValueType, table::TableBuilder};

    fn build(dir: &Path, compression: CompressionType) -> std::path::PathBuf {
        let path = dir.join("000001.sst");
        let mut builder = TableBuilder::new(&path, compression);
        let entries = [
            ("a", 3, ValueType::Value, "a3"),
            ("a", 1, ValueType::Value, "a1"),
            ("b", 4, ValueType::Deletion, ""),
            ("b", 2, ValueType::Value, "b2"),
            ("c", 5, ValueType::Value, "c5"),
        ];
        for (k, seq, t, v) in entries {
            builder
                .add(&InternalKey::new(Slice::from(k), seq, t), &Slice::from(v))
                .unwrap();
        }
        builder.finish().unwrap();
        path
    }

    fn lookup(table: &TableReader, key: &str, snapshot: u64) -> Option<Slice> {
        let mut ctx = GetContext::new(Slice::from(key), None);
        table.get(&mut ctx, snapshot);
        ctx.finish().unwrap()
    }

    #[test]
    fn test_get_respects_snapshot() {
        let dir = TempDir::new().unwrap();
        for compression in [
            CompressionType::None,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            let path = build(dir.path(), compression);
            let table = TableReader::open(&path, 1).unwrap();

            assert_eq!(table.num_entries(), 5);
            assert_eq!(lookup(&table, "a", u64::MAX), Some(Slice::from("a3")));
            assert_eq!(lookup(&table, "a", 2), Some(Slice::from("a1")));
            assert_eq!(lookup(&table, "b", u64::MAX), None);
            assert_eq!(lookup(&table, "b", 3), Some(Slice::from("b2")));
            assert_eq!(lookup(&table, "c", 4), None);
            assert_eq!(lookup(&table, "zzz", u64::MAX), None);
        }
    }

    #[test]
    fn test_seek_index_lands_on_visible_version() {
        let dir = TempDir::new().unwrap();
        let table = TableReader::open(build(dir.path(), CompressionType::Lz4), 1).unwrap();

        let first = table.entry(0).unwrap();
        assert_eq!(first.0.user_key(), &Slice::from("a"));
        assert_eq!(first.0.sequence(), 3);
        assert!(table.entry(5).is_none());

        let index = table.seek_index(&InternalKey::seek_key(Slice::from("b"), 3));
        assert_eq!(table.entry(index).unwrap().0.sequence(), 2);
        let index = table.seek_index(&InternalKey::seek_key(Slice::from("d"), u64::MAX));
        assert_eq!(index, table.num_entries());
    }

    #[test]
    fn test_detects_flipped_byte() {
        let dir = TempDir::new().unwrap();
        let path = build(dir.path(), CompressionType::None);
        let mut data = std::fs::read(&path).unwrap();
        data[3] ^= 0x40;
        std::fs::write(&path, data).unwrap();

        assert!(TableReader::open(&path, 1).unwrap_err().is_corruption());
    }
}
