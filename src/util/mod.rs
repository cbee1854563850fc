pub mod slice;
pub mod status;

pub use slice::Slice;
pub use status::{Code, Result, Status};

/// File name of a WAL segment with the given number.
pub fn log_file_name(number: u64) -> String {
    format!("{number:06}.log")
}

/// File name of a table file with the given number.
pub fn table_file_name(number: u64) -> String {
    format!("{number:06}.sst")
}

/// Kind of file found in a database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Log(u64),
    Table(u64),
}

/// Parse a file name produced by [`log_file_name`] or [`table_file_name`].
pub fn parse_file_name(name: &str) -> Option<FileType> {
    let (stem, ext) = name.rsplit_once('.')?;
    let number = stem.parse::<u64>().ok()?;
    match ext {
        "log" => Some(FileType::Log(number)),
        "sst" => Some(FileType::Table(number)),
        _ => None,
    }
}
