pub mod column_family;
pub mod compression;
pub mod db;
pub mod iterator;
pub mod memtable;
pub mod merge;
pub mod statistics;
pub mod table;
pub mod util;
pub mod version;
pub mod wal;

pub use column_family::{
    ColumnFamilyDescriptor, ColumnFamilyHandle, ColumnFamilyOptions, DEFAULT_COLUMN_FAMILY_NAME,
};
pub use compression::CompressionType;
pub use db::{DB, DBOptions, ReadOptions, Snapshot, WriteBatch, WriteOp, WriteOptions};
pub use iterator::{DBIterator, Iterator};
pub use merge::{CounterMerge, MergeOperator, StringAppendMerge};
pub use statistics::Statistics;
pub use util::{Code, Result, Slice, Status};
pub use wal::{LogSegment, SegmentState};
