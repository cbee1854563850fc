pub mod log_format;
pub mod reader;
pub mod wal_manager;
pub mod writer;

pub use log_format::{BLOCK_SIZE, HEADER_SIZE, RecordType};
pub use reader::Reader;
pub use wal_manager::{LogSegment, SegmentState, WalManager};
pub use writer::Writer;
