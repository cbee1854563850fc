use crate::{
    memtable::ValueType,
    merge::MergeOperator,
    util::{Result, Slice, Status},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetState {
    /// No version seen yet
    NotFound,
    /// Only merge operands seen so far; an older base may still follow
    Merging,
    Found(Slice),
    Deleted,
}

/// Accumulates the versions of one user key, newest first, until the
/// visible value is determined.
///
/// Memtables and table files feed their entries (already filtered to the
/// read snapshot) through [`GetContext::save_value`]; the lookup stops at the
/// first put or delete. Merge operands seen on the way are folded in by
/// [`GetContext::finish`].
pub struct GetContext<'a> {
    key: Slice,
    merge_operator: Option<&'a dyn MergeOperator>,
    /// Newest first
    operands: Vec<Slice>,
    state: GetState,
}

impl<'a> GetContext<'a> {
    pub fn new(key: Slice, merge_operator: Option<&'a dyn MergeOperator>) -> Self {
        GetContext {
            key,
            merge_operator,
            operands: Vec::new(),
            state: GetState::NotFound,
        }
    }

    pub fn key(&self) -> &Slice {
        &self.key
    }

    /// Record the next older version. Returns `true` once the result is known.
    pub fn save_value(&mut self, value_type: ValueType, value: &Slice) -> bool {
        match value_type {
            ValueType::Value => {
                self.state = GetState::Found(value.clone());
                true
            },
            ValueType::Deletion => {
                self.state = GetState::Deleted;
                true
            },
            ValueType::Merge => {
                self.operands.push(value.clone());
                self.state = GetState::Merging;
                false
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, GetState::Found(_) | GetState::Deleted)
    }

    pub fn state(&self) -> &GetState {
        &self.state
    }

    /// Resolve the visible value
    pub fn finish(mut self) -> Result<Option<Slice>> {
        let base = match self.state {
            GetState::Found(v) => Some(v),
            _ => None,
        };

        if self.operands.is_empty() {
            return Ok(base);
        }

        let Some(operator) = self.merge_operator else {
            return Err(Status::not_supported(format!(
                "key {} has merge operands but no merge operator is configured",
                self.key
            )));
        };

        self.operands.reverse();
        operator
            .full_merge(&self.key, base.as_ref(), &self.operands)
            .map(Some)
    }
}
