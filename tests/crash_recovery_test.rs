use std::fs::{self, OpenOptions};

use cfstore::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, DB, DBOptions, ReadOptions, Slice, WriteBatch,
    WriteOptions,
    util::{FileType, log_file_name, parse_file_name},
    wal,
};
use tempfile::TempDir;

/// Crash recovery tests
///
/// These tests leave the directory in the state a crash would: WAL records
/// that were appended but never applied, torn records at the end of a
/// segment, and damaged records in the middle of one.
fn descriptors(names: &[&str]) -> Vec<ColumnFamilyDescriptor> {
    names
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, ColumnFamilyOptions::default()))
        .collect()
}

fn options() -> DBOptions {
    DBOptions {
        create_missing_column_families: true,
        ..Default::default()
    }
}

fn max_log_number(dir: &std::path::Path) -> u64 {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| match parse_file_name(e.unwrap().file_name().to_str()?) {
            Some(FileType::Log(n)) | Some(FileType::Table(n)) => Some(n),
            None => None,
        })
        .max()
        .unwrap_or(0)
}

/// Append `batch` as if a writer had committed it and then crashed before
/// applying it to any memtable
fn append_unapplied(dir: &std::path::Path, sequence: u64, batch: &WriteBatch) {
    let path = dir.join(log_file_name(max_log_number(dir) + 1));
    let mut writer = wal::Writer::create(&path).unwrap();
    writer.add_record(&batch.encode(sequence)).unwrap();
    writer.sync().unwrap();
}

#[test]
fn test_committed_batch_spanning_column_families_recovered() {
    let temp_dir = TempDir::new().unwrap();
    let (last, ids) = {
        let (db, handles) =
            DB::open_cf(options(), temp_dir.path(), descriptors(&["default", "a", "b"])).unwrap();
        db.put_cf(&WriteOptions::default(), &handles[1], "before", "1")
            .unwrap();
        db.flush_cf(&handles[1]).unwrap();
        (
            db.latest_sequence_number(),
            handles.iter().map(|h| h.id()).collect::<Vec<_>>(),
        )
    };

    let mut batch = WriteBatch::new();
    batch.put_cf_id(ids[1], "k", "from-a");
    batch.put_cf_id(ids[2], "k", "from-b");
    batch.delete_cf_id(ids[1], "before");
    batch.put_cf_id(ids[0], "d", "from-default");
    append_unapplied(temp_dir.path(), last + 1, &batch);

    let (db, handles) =
        DB::open_cf(options(), temp_dir.path(), descriptors(&["default", "a", "b"])).unwrap();
    let ro = ReadOptions::default();
    assert_eq!(
        db.get_cf(&ro, &handles[1], "k").unwrap(),
        Some(Slice::from("from-a"))
    );
    assert_eq!(
        db.get_cf(&ro, &handles[2], "k").unwrap(),
        Some(Slice::from("from-b"))
    );
    assert_eq!(db.get_cf(&ro, &handles[1], "before").unwrap(), None);
    assert_eq!(
        db.get_cf(&ro, &handles[0], "d").unwrap(),
        Some(Slice::from("from-default"))
    );
    assert_eq!(db.latest_sequence_number(), last + 4);

    // Recovered data survives another restart after a flush
    db.flush(&handles.iter().collect::<Vec<_>>()).unwrap();
    drop(handles);
    drop(db);
    let (db, handles) =
        DB::open_cf(options(), temp_dir.path(), descriptors(&["default", "a", "b"])).unwrap();
    assert_eq!(
        db.get_cf(&ro, &handles[2], "k").unwrap(),
        Some(Slice::from("from-b"))
    );
    assert_eq!(db.latest_sequence_number(), last + 4);
}

#[test]
fn test_flushed_operations_not_applied_twice() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = DB::open(
            DBOptions {
                default_cf_options: ColumnFamilyOptions {
                    merge_operator: Some(std::sync::Arc::new(cfstore::CounterMerge)),
                    ..Default::default()
                },
                ..Default::default()
            },
            temp_dir.path(),
        )
        .unwrap();
        let other = db
            .create_column_family("other", ColumnFamilyOptions::default())
            .unwrap();
        let wo = WriteOptions::default();
        db.merge(&wo, "n", "1").unwrap();
        // Keeps the segment holding the merge alive
        db.put_cf(&wo, &other, "pin", "x").unwrap();
        db.flush_cf(&db.default_column_family()).unwrap();
        db.merge(&wo, "n", "10").unwrap();
    }

    let descriptors = vec![
        ColumnFamilyDescriptor::new(
            "default",
            ColumnFamilyOptions {
                merge_operator: Some(std::sync::Arc::new(cfstore::CounterMerge)),
                ..Default::default()
            },
        ),
        ColumnFamilyDescriptor::new("other", ColumnFamilyOptions::default()),
    ];
    let (db, _handles) = DB::open_cf(DBOptions::default(), temp_dir.path(), descriptors).unwrap();
    assert_eq!(
        db.get(&ReadOptions::default(), "n").unwrap(),
        Some(Slice::from("11"))
    );
}

#[test]
fn test_torn_tail_ignored() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = DB::open(DBOptions::default(), temp_dir.path()).unwrap();
        db.put(&WriteOptions::default(), "kept", "1").unwrap();
    }

    let mut batch = WriteBatch::new();
    batch.put("torn", "x".repeat(1000));
    append_unapplied(temp_dir.path(), 2, &batch);

    // Cut the last record short
    let path = temp_dir.path().join(log_file_name(max_log_number(temp_dir.path())));
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 100)
        .unwrap();

    let db = DB::open(DBOptions::default(), temp_dir.path()).unwrap();
    let ro = ReadOptions::default();
    assert_eq!(db.get(&ro, "kept").unwrap(), Some(Slice::from("1")));
    assert_eq!(db.get(&ro, "torn").unwrap(), None);
    assert_eq!(db.latest_sequence_number(), 1);
}

#[test]
fn test_checksum_mismatch_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = DB::open(DBOptions::default(), temp_dir.path()).unwrap();
        db.put(&WriteOptions::default(), "key", "value-to-damage")
            .unwrap();
    }

    let path = temp_dir.path().join(log_file_name(max_log_number(temp_dir.path())));
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xff;
    fs::write(&path, data).unwrap();

    let err = DB::open(DBOptions::default(), temp_dir.path()).err().unwrap();
    assert!(err.is_corruption());
}

#[test]
fn test_unopened_column_family_in_wal_is_skipped_after_drop() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = DB::open(DBOptions::default(), temp_dir.path()).unwrap();
        let doomed = db
            .create_column_family("doomed", ColumnFamilyOptions::default())
            .unwrap();
        db.put_cf(&WriteOptions::default(), &doomed, "k", "v").unwrap();
        db.put(&WriteOptions::default(), "k", "v").unwrap();
        db.drop_column_family(&doomed).unwrap();
    }

    // The WAL still holds the dropped column family's write
    let db = DB::open(DBOptions::default(), temp_dir.path()).unwrap();
    assert_eq!(db.list_live_column_families(), vec!["default"]);
    assert_eq!(
        db.get(&ReadOptions::default(), "k").unwrap(),
        Some(Slice::from("v"))
    );
    assert_eq!(db.latest_sequence_number(), 2);
}
