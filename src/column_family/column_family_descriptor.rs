use crate::{
    column_family::ColumnFamilyOptions,
    util::{Result, Status},
};

/// Longest accepted column family name, in bytes
pub const MAX_COLUMN_FAMILY_NAME_LEN: usize = 255;

/// Descriptor for creating or opening a Column Family
///
/// Contains the name and options for a column family.
/// Used when opening a database with multiple column families.
///
/// # Example
///
/// ```ignore
/// use cfstore::{DB, DBOptions, ColumnFamilyDescriptor, ColumnFamilyOptions};
///
/// let descriptors = vec![
///     ColumnFamilyDescriptor::new("default", ColumnFamilyOptions::default()),
///     ColumnFamilyDescriptor::new("users", ColumnFamilyOptions::default()),
///     ColumnFamilyDescriptor::new("posts", ColumnFamilyOptions {
///         write_buffer_size: 8 * 1024 * 1024,  // 8MB for posts
///         ..Default::default()
///     }),
/// ];
///
/// let (db, handles) = DB::open_cf(DBOptions::default(), "mydb", descriptors)?;
/// ```
#[derive(Debug, Clone)]
pub struct ColumnFamilyDescriptor {
    /// Name of the column family
    pub name: String,

    /// Options for this column family
    pub options: ColumnFamilyOptions,
}

impl ColumnFamilyDescriptor {
    /// Create a new column family descriptor
    pub fn new<S: Into<String>>(name: S, options: ColumnFamilyOptions) -> Self {
        ColumnFamilyDescriptor {
            name: name.into(),
            options,
        }
    }

    /// Reject names that cannot be stored or told apart
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Status::invalid_argument("Column family name is empty"));
        }
        if self.name.len() > MAX_COLUMN_FAMILY_NAME_LEN {
            return Err(Status::invalid_argument(format!(
                "Column family name longer than {MAX_COLUMN_FAMILY_NAME_LEN} bytes"
            )));
        }
        Ok(())
    }
}
