use cfstore::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, DB, DBOptions, Iterator, ReadOptions, WriteBatch,
    WriteOptions,
};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cfstore=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    println!("cfstore column family example");

    let options = DBOptions {
        create_missing_column_families: true,
        ..Default::default()
    };
    let descriptors = vec![
        ColumnFamilyDescriptor::new("default", ColumnFamilyOptions::default()),
        ColumnFamilyDescriptor::new("users", ColumnFamilyOptions::default()),
    ];
    let (db, mut handles) =
        DB::open_cf(options, "example_db", descriptors).expect("Failed to open database");
    let users = handles.pop().expect("users handle");

    let write_opts = WriteOptions::default();
    let read_opts = ReadOptions::default();

    // One atomic write across two column families
    let mut batch = WriteBatch::new();
    batch.put_cf(&users, "alice", "admin");
    batch.put_cf(&users, "bob", "guest");
    batch.put("last_user", "bob");
    db.write(&write_opts, batch).expect("Failed to write batch");

    let snapshot = db.snapshot();
    db.delete_cf(&write_opts, &users, "bob")
        .expect("Failed to delete");

    match db.get_cf(&read_opts, &users, "bob").expect("Failed to get") {
        Some(role) => println!("bob: {role}"),
        None => println!("bob has been deleted"),
    }

    let mut iter = db
        .iter_cf(&ReadOptions::at(&snapshot), &users)
        .expect("Failed to create iterator");
    let mut valid = iter.seek_to_first().expect("Failed to seek");
    while valid {
        println!("at snapshot {}: {} = {}", snapshot.sequence(), iter.key(), iter.value());
        valid = iter.next().expect("Failed to advance");
    }

    db.flush_cf(&users).expect("Failed to flush");
    println!("WAL segments: {}", db.wal_segments().len());
    println!("{}", db.statistics().report());

    drop(iter);
    drop(users);
    drop(handles);
    db.close().expect("Failed to close database");
    println!("Database closed successfully");
}
