use std::sync::Arc;

use crate::{
    iterator::InternalIterator,
    memtable::{InternalKey, MemTable},
    util::Slice,
};

/// Iterator over every version stored in a memtable
///
/// The skiplist is walked through range queries from the current key, so the
/// iterator never borrows the map and tolerates concurrent inserts. Entries
/// newer than the reader's snapshot may show up; `DBIterator` filters them.
pub struct MemTableIterator {
    mem: Arc<MemTable>,
    current: Option<(InternalKey, Slice)>,
}

impl MemTableIterator {
    pub fn new(mem: Arc<MemTable>) -> Self {
        MemTableIterator { mem, current: None }
    }
}

impl InternalIterator for MemTableIterator {
    fn seek_to_first(&mut self) {
        self.current = self.mem.next_entry(None);
    }

    fn seek(&mut self, target: &InternalKey) {
        self.current = self.mem.seek_entry(target);
    }

    fn next(&mut self) {
        if let Some((key, _)) = &self.current {
            self.current = self.mem.next_entry(Some(key));
        }
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &InternalKey {
        match &self.current {
            Some((key, _)) => key,
            None => panic!("MemTableIterator::key called on an invalid iterator"),
        }
    }

    fn value(&self) -> &Slice {
        match &self.current {
            Some((_, value)) => value,
            None => panic!("MemTableIterator::value called on an invalid iterator"),
        }
    }
}
