#[allow(clippy::module_inception)]
mod db;
mod options;
mod snapshot;
mod write_batch;

pub use db::DB;
pub use options::{DBOptions, ReadOptions, WriteOptions};
pub use snapshot::Snapshot;
pub(crate) use snapshot::SnapshotList;
pub use write_batch::{BATCH_HEADER_SIZE, MAX_FIELD_SIZE, WriteBatch, WriteOp};
