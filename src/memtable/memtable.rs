use std::{
    cmp::Ordering,
    ops::Bound,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering},
};

use crossbeam_skiplist::SkipMap;

use crate::{
    merge::GetContext,
    util::{Result, Slice, Status},
};

/// Kind of a versioned entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
    Merge = 2,
}

impl ValueType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(ValueType::Deletion),
            1 => Ok(ValueType::Value),
            2 => Ok(ValueType::Merge),
            _ => Err(Status::corruption(format!("Unknown value type: {v}"))),
        }
    }
}

/// User key tagged with the sequence number that wrote it
///
/// Ordered by user key ascending, then sequence descending, so the newest
/// version of a key is met first when scanning forward.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    user_key: Slice,
    sequence: u64,
    value_type: ValueType,
}

impl InternalKey {
    pub fn new(user_key: Slice, sequence: u64, value_type: ValueType) -> Self {
        InternalKey {
            user_key,
            sequence,
            value_type,
        }
    }

    /// Smallest internal key for `user_key` that is visible at `snapshot`
    pub fn seek_key(user_key: Slice, snapshot: u64) -> Self {
        InternalKey::new(user_key, snapshot, ValueType::Merge)
    }

    pub fn user_key(&self) -> &Slice {
        &self.user_key
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_deletion(&self) -> bool {
        self.value_type == ValueType::Deletion
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| (other.value_type as u8).cmp(&(self.value_type as u8)))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// In-memory sorted buffer of one column family's recent writes
///
/// Concurrent readers are lock-free. Writers are serialized by the DB write
/// path, which is also what makes the active/immutable switch safe.
pub struct MemTable {
    table: SkipMap<InternalKey, Slice>,
    approximate_memory: AtomicUsize,
    /// Smallest sequence inserted, `u64::MAX` while empty
    first_sequence: AtomicU64,
    /// Largest sequence inserted, 0 while empty
    last_sequence: AtomicU64,
}

impl MemTable {
    pub fn new() -> Self {
        MemTable {
            table: SkipMap::new(),
            approximate_memory: AtomicUsize::new(0),
            first_sequence: AtomicU64::new(u64::MAX),
            last_sequence: AtomicU64::new(0),
        }
    }

    pub fn add(&self, sequence: u64, value_type: ValueType, key: Slice, value: Slice) {
        // Per-entry bookkeeping overhead: sequence + type.
        let mem_usage = key.size() + value.size() + 9;
        self.approximate_memory
            .fetch_add(mem_usage, AtomicOrdering::Relaxed);
        self.first_sequence
            .fetch_min(sequence, AtomicOrdering::AcqRel);
        self.last_sequence
            .fetch_max(sequence, AtomicOrdering::AcqRel);

        self.table
            .insert(InternalKey::new(key, sequence, value_type), value);
    }

    /// Feed every version of `ctx.key()` visible at `snapshot`, newest first,
    /// until `ctx` is satisfied. Returns `true` if the lookup is complete.
    pub fn get(&self, ctx: &mut GetContext<'_>, snapshot: u64) -> bool {
        let start = InternalKey::seek_key(ctx.key().clone(), snapshot);

        for entry in self.table.range(start..) {
            if entry.key().user_key() != ctx.key() {
                break;
            }
            if ctx.save_value(entry.key().value_type(), entry.value()) {
                return true;
            }
        }
        false
    }

    /// First entry strictly after `after` (or the first entry at all)
    pub fn next_entry(&self, after: Option<&InternalKey>) -> Option<(InternalKey, Slice)> {
        let entry = match after {
            Some(key) => self
                .table
                .range((Bound::Excluded(key), Bound::Unbounded))
                .next(),
            None => self.table.front(),
        };
        entry.map(|e| (e.key().clone(), e.value().clone()))
    }

    /// First entry at or after `target`
    pub fn seek_entry(&self, target: &InternalKey) -> Option<(InternalKey, Slice)> {
        self.table
            .range((Bound::Included(target), Bound::Unbounded))
            .next()
            .map(|e| (e.key().clone(), e.value().clone()))
    }

    /// All entries in internal key order, for persisting into a table file
    pub fn entries(&self) -> Vec<(InternalKey, Slice)> {
        self.table
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn approximate_memory_usage(&self) -> usize {
        self.approximate_memory.load(AtomicOrdering::Relaxed)
    }

    pub fn first_sequence(&self) -> Option<u64> {
        match self.first_sequence.load(AtomicOrdering::Acquire) {
            u64::MAX => None,
            seq => Some(seq),
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        match self.last_sequence.load(AtomicOrdering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    pub fn num_entries(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
