/// Column Family module for cfstore
///
/// Column Families allow multiple logical key spaces within a single DB
/// instance. Each CF has independent:
/// - MemTable and immutable MemTables
/// - Table files and flushed sequence
/// - Options (write buffer size, compression, merge operator)
///
/// All column families share one WAL and one sequence space, so a
/// `WriteBatch` spanning several of them commits atomically.
///
/// # Architecture
///
/// ```text
/// DB
///  ├─→ WAL (shared, segmented)
///  ├─→ ColumnFamily("default")
///  │    ├─→ MemTable
///  │    ├─→ Immutable MemTables
///  │    └─→ Table files
///  ├─→ ColumnFamily("users")
///  │    ├─→ MemTable
///  │    └─→ ...
///  └─→ ColumnFamily("posts")
///       └─→ ...
/// ```
///
/// # Usage
///
/// ```ignore
/// use cfstore::{DB, DBOptions, ColumnFamilyOptions, ReadOptions, WriteOptions};
///
/// let db = DB::open(DBOptions::default(), "mydb")?;
///
/// // Create a new column family
/// let users_cf = db.create_column_family("users", ColumnFamilyOptions::default())?;
///
/// // Write to specific CF
/// db.put_cf(&WriteOptions::default(), &users_cf, "user1", "alice")?;
///
/// // Read from specific CF
/// let value = db.get_cf(&ReadOptions::default(), &users_cf, "user1")?;
/// ```
mod column_family_data;
pub mod column_family_descriptor;
pub mod column_family_handle;
pub mod column_family_options;
mod column_family_set;

pub(crate) use column_family_data::{ColumnFamilyData, SuperVersion};
pub use column_family_descriptor::{ColumnFamilyDescriptor, MAX_COLUMN_FAMILY_NAME_LEN};
pub use column_family_handle::ColumnFamilyHandle;
pub use column_family_options::ColumnFamilyOptions;
pub(crate) use column_family_set::ColumnFamilySet;

/// Default column family name
pub const DEFAULT_COLUMN_FAMILY_NAME: &str = "default";
