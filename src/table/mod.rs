pub mod format;
pub mod table_builder;
pub mod table_file_set;
pub mod table_reader;

pub use table_builder::{BuiltTable, TableBuilder};
pub use table_file_set::TableFileSet;
pub use table_reader::TableReader;
