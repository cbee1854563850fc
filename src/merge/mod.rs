mod get_context;

pub use get_context::{GetContext, GetState};

use crate::{Result, Slice};

/// Read-modify-write combinator attached to a column family
///
/// A `merge` write stores an operand instead of a value. Reads fold every
/// operand newer than the last put (or delete) into the base value, oldest
/// operand first.
///
/// ```ignore
/// use std::sync::Arc;
/// use cfstore::{ColumnFamilyOptions, merge::CounterMerge};
///
/// let options = ColumnFamilyOptions {
///     merge_operator: Some(Arc::new(CounterMerge)),
///     ..Default::default()
/// };
/// let counters = db.create_column_family("counters", options)?;
/// db.merge_cf(&WriteOptions::default(), &counters, "hits", "1")?;
/// ```
pub trait MergeOperator: Send + Sync {
    fn name(&self) -> &str;

    /// Combine `existing_value` (None if the key is absent or deleted) with
    /// `operands`, given oldest first.
    fn full_merge(
        &self,
        key: &Slice,
        existing_value: Option<&Slice>,
        operands: &[Slice],
    ) -> Result<Slice>;
}

/// Interprets values and operands as decimal i64 and adds them up.
/// Operands that do not parse are ignored.
pub struct CounterMerge;

impl MergeOperator for CounterMerge {
    fn name(&self) -> &str {
        "CounterMerge"
    }

    fn full_merge(
        &self,
        _key: &Slice,
        existing_value: Option<&Slice>,
        operands: &[Slice],
    ) -> Result<Slice> {
        let parse = |s: &Slice| {
            std::str::from_utf8(s.data())
                .ok()
                .and_then(|v| v.trim().parse::<i64>().ok())
        };

        let base = existing_value.and_then(parse).unwrap_or(0);
        let sum = operands
            .iter()
            .filter_map(parse)
            .fold(base, i64::wrapping_add);

        Ok(Slice::from(sum.to_string()))
    }
}

/// Appends operands to the existing value, separated by `delimiter`
pub struct StringAppendMerge {
    delimiter: Vec<u8>,
}

impl StringAppendMerge {
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Self {
        StringAppendMerge {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for StringAppendMerge {
    fn default() -> Self {
        StringAppendMerge::new(Vec::new())
    }
}

impl MergeOperator for StringAppendMerge {
    fn name(&self) -> &str {
        "StringAppendMerge"
    }

    fn full_merge(
        &self,
        _key: &Slice,
        existing_value: Option<&Slice>,
        operands: &[Slice],
    ) -> Result<Slice> {
        let mut parts = existing_value.into_iter().chain(operands.iter());
        let mut result = Vec::new();

        if let Some(first) = parts.next() {
            result.extend_from_slice(first.data());
        }
        for part in parts {
            result.extend_from_slice(&self.delimiter);
            result.extend_from_slice(part.data());
        }

        Ok(Slice::from(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_merge_with_existing_value() {
        let merge = CounterMerge;
        let key = Slice::from("counter");
        let existing = Slice::from("10");
        let operands = vec![Slice::from("5"), Slice::from("3"), Slice::from("-2")];

        let result = merge.full_merge(&key, Some(&existing), &operands).unwrap();
        assert_eq!(result.to_string(), "16");
    }

    #[test]
    fn test_counter_merge_skips_garbage() {
        let merge = CounterMerge;
        let key = Slice::from("counter");
        let operands = vec![Slice::from("5"), Slice::from("abc"), Slice::from("10")];

        let result = merge.full_merge(&key, None, &operands).unwrap();
        assert_eq!(result.to_string(), "15");
    }

    #[test]
    fn test_string_append_with_delimiter() {
        let merge = StringAppendMerge::new(",");
        let key = Slice::from("log");
        let existing = Slice::from("a");
        let operands = vec![Slice::from("b"), Slice::from("c")];

        let result = merge.full_merge(&key, Some(&existing), &operands).unwrap();
        assert_eq!(result.to_string(), "a,b,c");
    }

    #[test]
    fn test_string_append_no_existing_value() {
        let merge = StringAppendMerge::new(" ");
        let key = Slice::from("log");
        let operands = vec![Slice::from("Hello"), Slice::from("World")];

        let result = merge.full_merge(&key, None, &operands).unwrap();
        assert_eq!(result.to_string(), "Hello World");
    }
}
