use std::sync::atomic::{AtomicU64, Ordering};

/// Database-wide statistics
///
/// Lock-free atomic counters updated on the write, read, flush and WAL
/// paths. Read them through the getters or [`Statistics::report`].
#[derive(Debug, Default)]
pub struct Statistics {
    // Write path
    pub num_batches_written: AtomicU64,
    pub num_keys_written: AtomicU64,
    pub num_keys_deleted: AtomicU64,
    pub num_merges: AtomicU64,
    pub bytes_written: AtomicU64,

    // Read path
    pub num_keys_read: AtomicU64,
    pub num_keys_found: AtomicU64,
    pub num_iterators_created: AtomicU64,

    // Flush
    pub num_memtable_flushes: AtomicU64,
    pub bytes_flushed: AtomicU64,
    pub num_flush_retries: AtomicU64,
    pub num_forced_flushes: AtomicU64,

    // WAL
    pub wal_syncs: AtomicU64,
    pub wal_bytes_written: AtomicU64,
    pub wal_segments_created: AtomicU64,
    pub wal_segments_retired: AtomicU64,

    // Column family lifecycle
    pub column_families_created: AtomicU64,
    pub column_families_dropped: AtomicU64,
    pub column_families_destroyed: AtomicU64,

    pub num_errors: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    pub fn record_batch(&self, puts: u64, deletes: u64, merges: u64, bytes: u64) {
        self.num_batches_written.fetch_add(1, Ordering::Relaxed);
        self.num_keys_written.fetch_add(puts, Ordering::Relaxed);
        self.num_keys_deleted.fetch_add(deletes, Ordering::Relaxed);
        self.num_merges.fetch_add(merges, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_read(&self, found: bool) {
        self.num_keys_read.fetch_add(1, Ordering::Relaxed);
        if found {
            self.num_keys_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_iterator(&self) {
        self.num_iterators_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memtable_flush(&self, bytes: u64) {
        self.num_memtable_flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_flush_retry(&self) {
        self.num_flush_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_flush(&self) {
        self.num_forced_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wal_write(&self, bytes: u64, synced: bool) {
        self.wal_bytes_written.fetch_add(bytes, Ordering::Relaxed);
        if synced {
            self.wal_syncs.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_wal_segment_created(&self) {
        self.wal_segments_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wal_segments_retired(&self, count: u64) {
        self.wal_segments_retired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_column_family_created(&self) {
        self.column_families_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_column_family_dropped(&self) {
        self.column_families_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_column_family_destroyed(&self) {
        self.column_families_destroyed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.num_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Getters (snapshot values)
    pub fn num_batches_written(&self) -> u64 {
        self.num_batches_written.load(Ordering::Relaxed)
    }

    pub fn num_keys_written(&self) -> u64 {
        self.num_keys_written.load(Ordering::Relaxed)
    }

    pub fn num_keys_deleted(&self) -> u64 {
        self.num_keys_deleted.load(Ordering::Relaxed)
    }

    pub fn num_keys_read(&self) -> u64 {
        self.num_keys_read.load(Ordering::Relaxed)
    }

    pub fn num_memtable_flushes(&self) -> u64 {
        self.num_memtable_flushes.load(Ordering::Relaxed)
    }

    pub fn num_flush_retries(&self) -> u64 {
        self.num_flush_retries.load(Ordering::Relaxed)
    }

    pub fn num_forced_flushes(&self) -> u64 {
        self.num_forced_flushes.load(Ordering::Relaxed)
    }

    pub fn wal_segments_retired(&self) -> u64 {
        self.wal_segments_retired.load(Ordering::Relaxed)
    }

    pub fn column_families_destroyed(&self) -> u64 {
        self.column_families_destroyed.load(Ordering::Relaxed)
    }

    pub fn read_hit_rate(&self) -> f64 {
        let found = self.num_keys_found.load(Ordering::Relaxed) as f64;
        let total = self.num_keys_read.load(Ordering::Relaxed) as f64;
        if total > 0.0 { found / total } else { 0.0 }
    }

    /// Get a formatted statistics report
    pub fn report(&self) -> String {
        let mb = |v: &AtomicU64| v.load(Ordering::Relaxed) as f64 / 1024.0 / 1024.0;
        format!(
            "Database Statistics:\n\
            \n\
            Writes:\n\
            - Batches:       {}\n\
            - Puts:          {}\n\
            - Deletes:       {}\n\
            - Merges:        {}\n\
            - Bytes written: {} ({:.2} MB)\n\
            \n\
            Reads:\n\
            - Gets:          {}\n\
            - Hit rate:      {:.2}%\n\
            - Iterators:     {}\n\
            \n\
            Flush:\n\
            - Flushes:       {}\n\
            - Forced:        {}\n\
            - Retries:       {}\n\
            - Bytes flushed: {:.2} MB\n\
            \n\
            WAL:\n\
            - Syncs:         {}\n\
            - Bytes written: {:.2} MB\n\
            - Segments:      {} created, {} retired\n\
            \n\
            Column families: {} created, {} dropped, {} destroyed\n\
            \n\
            Errors:          {}",
            self.num_batches_written(),
            self.num_keys_written(),
            self.num_keys_deleted(),
            self.num_merges.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
            mb(&self.bytes_written),
            self.num_keys_read(),
            self.read_hit_rate() * 100.0,
            self.num_iterators_created.load(Ordering::Relaxed),
            self.num_memtable_flushes(),
            self.num_forced_flushes(),
            self.num_flush_retries(),
            mb(&self.bytes_flushed),
            self.wal_syncs.load(Ordering::Relaxed),
            mb(&self.wal_bytes_written),
            self.wal_segments_created.load(Ordering::Relaxed),
            self.wal_segments_retired(),
            self.column_families_created.load(Ordering::Relaxed),
            self.column_families_dropped.load(Ordering::Relaxed),
            self.column_families_destroyed(),
            self.num_errors.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_basic() {
        let stats = Statistics::new();

        stats.record_batch(2, 1, 0, 300);
        stats.record_batch(1, 0, 3, 50);

        assert_eq!(stats.num_batches_written(), 2);
        assert_eq!(stats.num_keys_written(), 3);
        assert_eq!(stats.num_keys_deleted(), 1);
        assert_eq!(stats.num_merges.load(Ordering::Relaxed), 3);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 350);
    }

    #[test]
    fn test_read_hit_rate() {
        let stats = Statistics::new();
        assert_eq!(stats.read_hit_rate(), 0.0);

        stats.record_read(true);
        stats.record_read(true);
        stats.record_read(true);
        stats.record_read(false);

        assert_eq!(stats.read_hit_rate(), 0.75);
    }

    #[test]
    fn test_statistics_report() {
        let stats = Statistics::new();

        stats.record_batch(1, 0, 0, 1024);
        stats.record_read(true);
        stats.record_read(false);
        stats.record_wal_segment_created();
        stats.record_wal_segments_retired(1);

        let report = stats.report();
        assert!(report.contains("Puts:          1"));
        assert!(report.contains("Gets:          2"));
        assert!(report.contains("Hit rate:      50.00%"));
        assert!(report.contains("Segments:      1 created, 1 retired"));
    }
}
