use std::time::Duration;

use crate::{column_family::ColumnFamilyOptions, db::Snapshot};

#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// fsync the WAL segment before the write returns
    pub sync: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Read as of this snapshot instead of the latest state
    pub snapshot: Option<Snapshot>,
}

impl ReadOptions {
    pub fn at(snapshot: &Snapshot) -> Self {
        ReadOptions {
            snapshot: Some(snapshot.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DBOptions {
    pub create_if_missing: bool,
    pub error_if_exists: bool,
    /// Create column families named by `open_cf` that are not on disk yet
    pub create_missing_column_families: bool,
    /// Roll the active WAL segment once it reaches this size
    pub max_log_file_size: u64,
    /// Force flushes once all WAL segments together exceed this size.
    /// 0 derives the limit from the live column families: four times the
    /// sum of their `write_buffer_size`.
    pub max_total_wal_size: u64,
    /// Retries of a failed flush before the column family enters the fatal
    /// state
    pub flush_retry_attempts: u32,
    /// Delay before the first retry; doubled after each failure
    pub flush_retry_backoff: Duration,
    /// Options of the `default` column family when `open` creates it
    pub default_cf_options: ColumnFamilyOptions,
}

impl Default for DBOptions {
    fn default() -> Self {
        DBOptions {
            create_if_missing: true,
            error_if_exists: false,
            create_missing_column_families: false,
            max_log_file_size: 64 * 1024 * 1024, // 64MB
            max_total_wal_size: 0,
            flush_retry_attempts: 3,
            flush_retry_backoff: Duration::from_millis(10),
            default_cf_options: ColumnFamilyOptions::default(),
        }
    }
}
