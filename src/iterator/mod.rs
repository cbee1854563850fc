//! Iterators over column family contents
//!
//! ```text
//! DB::iter_cf() / DB::new_iterators()
//!     ↓
//! DBIterator (resolves versions at one snapshot sequence)
//!     ↓
//! MergingIterator (internal key order)
//!     ├─→ MemTableIterator (active memtable)
//!     ├─→ MemTableIterator (immutable memtables, newest first)
//!     └─→ TableIterator (table files, newest first)
//! ```
//!
//! Child iterators hold `Arc`s to the memtables and table files they walk,
//! so an iterator stays usable while flushes swap the column family's
//! state or the column family is dropped.
use crate::{
    memtable::InternalKey,
    util::{Result, Slice},
};

/// Forward iterator over the user-visible key/value pairs of one column
/// family
///
/// An iterator starts unpositioned:
///
/// ```ignore
/// let mut iter = db.iter_cf(&ReadOptions::default(), &handle)?;
/// iter.seek_to_first()?;
/// while iter.valid() {
///     println!("{:?}: {:?}", iter.key(), iter.value());
///     iter.next()?;
/// }
/// ```
///
/// The iterator becomes invalid when an operation returns an error.
pub trait Iterator {
    /// Position at the first key. Returns `Ok(false)` if there is none.
    fn seek_to_first(&mut self) -> Result<bool>;

    /// Position at the first key >= target. Returns `Ok(false)` if there is
    /// none.
    fn seek(&mut self, target: &Slice) -> Result<bool>;

    /// Move to the next key
    ///
    /// Prerequisite: valid() == true
    fn next(&mut self) -> Result<bool>;

    /// Prerequisite: valid() == true
    fn key(&self) -> Slice;

    /// Prerequisite: valid() == true
    fn value(&self) -> Slice;

    fn valid(&self) -> bool;
}

/// Cursor over raw versioned entries in internal key order
pub trait InternalIterator: Send {
    fn seek_to_first(&mut self);

    /// Position at the first entry >= target
    fn seek(&mut self, target: &InternalKey);

    fn next(&mut self);

    fn valid(&self) -> bool;

    /// Prerequisite: valid() == true
    fn key(&self) -> &InternalKey;

    /// Prerequisite: valid() == true
    fn value(&self) -> &Slice;
}

mod db_iterator;
mod memtable_iterator;
mod merging_iterator;
mod table_iterator;

pub use db_iterator::DBIterator;
pub use memtable_iterator::MemTableIterator;
pub use merging_iterator::MergingIterator;
pub use table_iterator::TableIterator;
