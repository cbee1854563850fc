use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{
    iterator::InternalIterator,
    memtable::InternalKey,
    util::Slice,
};

/// Merging iterator for combining multiple sorted child iterators
///
/// Uses a min-heap keyed on the children's current internal keys, so entries
/// come out in internal key order: user key ascending, newest version first.
/// When two children hold an identical internal key the lower index wins;
/// children are passed newest source first.
pub struct MergingIterator {
    children: Vec<Box<dyn InternalIterator>>,
    heap: BinaryHeap<HeapEntry>,
}

/// Entry in the min-heap, ordered by key (reversed) then by index (reversed)
struct HeapEntry {
    key: InternalKey,
    index: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for HeapEntry {}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.index == other.index
    }
}

impl MergingIterator {
    pub fn new(children: Vec<Box<dyn InternalIterator>>) -> Self {
        MergingIterator {
            children,
            heap: BinaryHeap::new(),
        }
    }

    fn rebuild_heap(&mut self) {
        self.heap.clear();
        for (index, child) in self.children.iter().enumerate() {
            if child.valid() {
                self.heap.push(HeapEntry {
                    key: child.key().clone(),
                    index,
                });
            }
        }
    }

    fn top(&self) -> &dyn InternalIterator {
        match self.heap.peek() {
            Some(entry) => self.children[entry.index].as_ref(),
            None => panic!("MergingIterator accessed while invalid"),
        }
    }
}

impl InternalIterator for MergingIterator {
    fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.rebuild_heap();
    }

    fn seek(&mut self, target: &InternalKey) {
        for child in &mut self.children {
            child.seek(target);
        }
        self.rebuild_heap();
    }

    fn next(&mut self) {
        let Some(entry) = self.heap.pop() else {
            return;
        };
        let child = &mut self.children[entry.index];
        child.next();
        if child.valid() {
            self.heap.push(HeapEntry {
                key: child.key().clone(),
                index: entry.index,
            });
        }
    }

    fn valid(&self) -> bool {
        !self.heap.is_empty()
    }

    fn key(&self) -> &InternalKey {
        self.top().key()
    }

    fn value(&self) -> &Slice {
        self.top().value()
    }
}
