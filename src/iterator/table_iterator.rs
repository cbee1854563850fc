use std::sync::Arc;

use crate::{
    iterator::InternalIterator,
    memtable::InternalKey,
    table::TableReader,
    util::Slice,
};

/// Iterator over the entries of one table file
pub struct TableIterator {
    table: Arc<TableReader>,
    index: usize,
}

impl TableIterator {
    pub fn new(table: Arc<TableReader>) -> Self {
        let index = table.num_entries();
        TableIterator { table, index }
    }

    fn current(&self) -> &(InternalKey, Slice) {
        // Callers check valid() first; index is always in bounds then.
        &self.table.entries()[self.index]
    }
}

impl InternalIterator for TableIterator {
    fn seek_to_first(&mut self) {
        self.index = 0;
    }

    fn seek(&mut self, target: &InternalKey) {
        self.index = self.table.seek_index(target);
    }

    fn next(&mut self) {
        if self.valid() {
            self.index += 1;
        }
    }

    fn valid(&self) -> bool {
        self.index < self.table.num_entries()
    }

    fn key(&self) -> &InternalKey {
        &self.current().0
    }

    fn value(&self) -> &Slice {
        &self.current().1
    }
}
