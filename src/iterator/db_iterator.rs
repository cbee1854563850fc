use std::sync::Arc;

use crate::{
    db::Snapshot,
    iterator::{InternalIterator, Iterator, MergingIterator},
    memtable::InternalKey,
    merge::{GetContext, MergeOperator},
    util::{Result, Slice},
};

/// User-facing iterator over one column family at a fixed sequence number
///
/// Entries newer than the sequence are skipped. For every user key the
/// visible versions are folded exactly as a point lookup would: the newest
/// put wins, a delete hides the key, merge operands are combined with the
/// column family's merge operator.
pub struct DBIterator {
    inner: MergingIterator,
    sequence: u64,
    merge_operator: Option<Arc<dyn MergeOperator>>,
    /// Keeps the snapshot alive for the iterator's lifetime
    _snapshot: Snapshot,
    key: Slice,
    value: Slice,
    valid: bool,
}

impl DBIterator {
    pub(crate) fn new(
        inner: MergingIterator,
        snapshot: Snapshot,
        merge_operator: Option<Arc<dyn MergeOperator>>,
    ) -> Self {
        DBIterator {
            inner,
            sequence: snapshot.sequence(),
            merge_operator,
            _snapshot: snapshot,
            key: Slice::empty(),
            value: Slice::empty(),
            valid: false,
        }
    }

    /// Sequence number this iterator reads at
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Resolve the next user key at or after the inner position. Consumes
    /// every version of the returned key.
    fn find_next_user_entry(&mut self) -> Result<bool> {
        self.valid = false;

        while self.inner.valid() {
            if self.inner.key().sequence() > self.sequence {
                self.inner.next();
                continue;
            }

            let user_key = self.inner.key().user_key().clone();
            let mut ctx = GetContext::new(user_key.clone(), self.merge_operator.as_deref());
            while self.inner.valid() && self.inner.key().user_key() == &user_key {
                let key = self.inner.key();
                if key.sequence() <= self.sequence && !ctx.is_done() {
                    ctx.save_value(key.value_type(), self.inner.value());
                }
                self.inner.next();
            }

            if let Some(value) = ctx.finish()? {
                self.key = user_key;
                self.value = value;
                self.valid = true;
                return Ok(true);
            }
        }

        Ok(false)
    }
}

impl Iterator for DBIterator {
    fn seek_to_first(&mut self) -> Result<bool> {
        self.inner.seek_to_first();
        self.find_next_user_entry()
    }

    fn seek(&mut self, target: &Slice) -> Result<bool> {
        self.inner
            .seek(&InternalKey::seek_key(target.clone(), self.sequence));
        self.find_next_user_entry()
    }

    fn next(&mut self) -> Result<bool> {
        if !self.valid {
            return Ok(false);
        }
        self.find_next_user_entry()
    }

    fn key(&self) -> Slice {
        self.key.clone()
    }

    fn value(&self) -> Slice {
        self.value.clone()
    }

    fn valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        iterator::MemTableIterator,
        memtable::{MemTable, ValueType},
        merge::StringAppendMerge,
    };

    fn iter_over(mems: Vec<Arc<MemTable>>, sequence: u64) -> DBIterator {
        let children = mems
            .into_iter()
            .map(|m| Box::new(MemTableIterator::new(m)) as Box<dyn InternalIterator>)
            .collect();
        DBIterator::new(
            MergingIterator::new(children),
            Snapshot::new(sequence),
            Some(Arc::new(StringAppendMerge::new("+"))),
        )
    }

    fn collect(iter: &mut DBIterator) -> Vec<(String, String)> {
        let mut out = Vec::new();
        iter.seek_to_first().unwrap();
        while iter.valid() {
            out.push((iter.key().to_string(), iter.value().to_string()));
            iter.next().unwrap();
        }
        out
    }

    #[test]
    fn test_resolves_overwrites_and_deletes() {
        let mem = Arc::new(MemTable::new());
        mem.add(1, ValueType::Value, Slice::from("a"), Slice::from("a1"));
        mem.add(2, ValueType::Value, Slice::from("b"), Slice::from("b2"));
        mem.add(3, ValueType::Value, Slice::from("a"), Slice::from("a3"));
        mem.add(4, ValueType::Deletion, Slice::from("b"), Slice::empty());
        mem.add(5, ValueType::Value, Slice::from("c"), Slice::from("c5"));

        let mut iter = iter_over(vec![mem.clone()], 5);
        assert_eq!(
            collect(&mut iter),
            vec![("a".into(), "a3".into()), ("c".into(), "c5".into())]
        );

        let mut iter = iter_over(vec![mem], 2);
        assert_eq!(
            collect(&mut iter),
            vec![("a".into(), "a1".into()), ("b".into(), "b2".into())]
        );
    }

    #[test]
    fn test_merges_across_sources() {
        let older = Arc::new(MemTable::new());
        older.add(1, ValueType::Value, Slice::from("k"), Slice::from("x"));
        older.add(2, ValueType::Merge, Slice::from("k"), Slice::from("y"));
        let newer = Arc::new(MemTable::new());
        newer.add(3, ValueType::Merge, Slice::from("k"), Slice::from("z"));

        let mut iter = iter_over(vec![newer, older], u64::MAX);
        assert_eq!(collect(&mut iter), vec![("k".into(), "x+y+z".into())]);
    }

    #[test]
    fn test_seek_skips_hidden_keys() {
        let mem = Arc::new(MemTable::new());
        mem.add(1, ValueType::Value, Slice::from("a"), Slice::from("1"));
        mem.add(2, ValueType::Value, Slice::from("b"), Slice::from("2"));
        mem.add(9, ValueType::Value, Slice::from("bb"), Slice::from("9"));
        mem.add(3, ValueType::Value, Slice::from("c"), Slice::from("3"));

        let mut iter = iter_over(vec![mem], 3);
        assert!(iter.seek(&Slice::from("b")).unwrap());
        assert_eq!(iter.key(), Slice::from("b"));
        assert!(iter.next().unwrap());
        assert_eq!(iter.key(), Slice::from("c"));
        assert!(!iter.next().unwrap());
        assert!(!iter.valid());
    }
}
