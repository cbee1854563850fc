pub mod version_edit;
pub mod version_set;

pub use version_edit::{FileMetaData, NewColumnFamily, VersionEdit};
pub use version_set::{ColumnFamilyRecord, MANIFEST_FILE_NAME, ManifestState, VersionSet};
