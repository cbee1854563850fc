use crate::{
    column_family::ColumnFamilyHandle,
    memtable::ValueType,
    util::{Result, Slice, Status},
};

/// Write operation type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Slice, value: Slice },
    Delete { key: Slice },
    Merge { key: Slice, operand: Slice },
}

impl WriteOp {
    pub fn key(&self) -> &Slice {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } | WriteOp::Merge { key, .. } => key,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            WriteOp::Put { .. } => ValueType::Value,
            WriteOp::Delete { .. } => ValueType::Deletion,
            WriteOp::Merge { .. } => ValueType::Merge,
        }
    }

    /// Value stored in the memtable; empty for deletions
    pub fn value(&self) -> Slice {
        match self {
            WriteOp::Put { value, .. } => value.clone(),
            WriteOp::Delete { .. } => Slice::empty(),
            WriteOp::Merge { operand, .. } => operand.clone(),
        }
    }
}

/// Header of an encoded batch: base sequence (8 bytes) + op count (4 bytes)
pub const BATCH_HEADER_SIZE: usize = 12;

/// Longest key or value a 4-byte length prefix can describe
pub const MAX_FIELD_SIZE: usize = u32::MAX as usize;

/// WriteBatch accumulates operations on any number of column families for
/// atomic execution
///
/// Operations apply in insertion order and each one takes the next sequence
/// number, so a batch of `n` operations written at base sequence `s` covers
/// `s..=s + n - 1`.
///
/// WAL record format:
/// - Base sequence (8 bytes) + operation count (4 bytes)
/// - Per operation: type (1 byte), column family id (4 bytes),
///   key length (4 bytes) + key, and for put/merge value length (4 bytes) +
///   value
///
/// A key or value longer than [`MAX_FIELD_SIZE`] is not added; the batch
/// remembers the error and [`DB::write`](crate::DB::write) rejects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Operations in insertion order: (cf_id, operation)
    ops: Vec<(u32, WriteOp)>,
    /// Approximate payload size in bytes
    data_size: usize,
    /// First operation that could not be added
    error: Option<Status>,
}

impl WriteBatch {
    /// Create a new empty WriteBatch
    #[inline]
    pub fn new() -> Self {
        WriteBatch::default()
    }

    /// Create WriteBatch with reserved capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        WriteBatch {
            ops: Vec::with_capacity(capacity),
            data_size: 0,
            error: None,
        }
    }

    fn push(&mut self, cf_id: u32, op: WriteOp) {
        self.push_limited(cf_id, op, MAX_FIELD_SIZE);
    }

    pub(crate) fn push_limited(&mut self, cf_id: u32, op: WriteOp, limit: usize) {
        let value_size = match &op {
            WriteOp::Put { value, .. } => value.size(),
            WriteOp::Merge { operand, .. } => operand.size(),
            WriteOp::Delete { .. } => 0,
        };
        if op.key().size() > limit || value_size > limit {
            if self.error.is_none() {
                self.error = Some(Status::invalid_argument(format!(
                    "Operation on key of {} bytes with value of {value_size} bytes exceeds \
                     the {limit} byte limit",
                    op.key().size()
                )));
            }
            return;
        }
        self.data_size += op.key().size() + value_size;
        self.ops.push((cf_id, op));
    }

    /// Error of the first operation that could not be added
    pub fn validate(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Put into the default column family
    pub fn put(&mut self, key: impl Into<Slice>, value: impl Into<Slice>) {
        self.put_cf_id(0, key, value);
    }

    pub fn put_cf(
        &mut self,
        cf: &ColumnFamilyHandle,
        key: impl Into<Slice>,
        value: impl Into<Slice>,
    ) {
        self.put_cf_id(cf.id(), key, value);
    }

    pub fn put_cf_id(&mut self, cf_id: u32, key: impl Into<Slice>, value: impl Into<Slice>) {
        self.push(
            cf_id,
            WriteOp::Put {
                key: key.into(),
                value: value.into(),
            },
        );
    }

    /// Delete from the default column family
    pub fn delete(&mut self, key: impl Into<Slice>) {
        self.delete_cf_id(0, key);
    }

    pub fn delete_cf(&mut self, cf: &ColumnFamilyHandle, key: impl Into<Slice>) {
        self.delete_cf_id(cf.id(), key);
    }

    pub fn delete_cf_id(&mut self, cf_id: u32, key: impl Into<Slice>) {
        self.push(cf_id, WriteOp::Delete { key: key.into() });
    }

    /// Merge into the default column family
    pub fn merge(&mut self, key: impl Into<Slice>, operand: impl Into<Slice>) {
        self.merge_cf_id(0, key, operand);
    }

    pub fn merge_cf(
        &mut self,
        cf: &ColumnFamilyHandle,
        key: impl Into<Slice>,
        operand: impl Into<Slice>,
    ) {
        self.merge_cf_id(cf.id(), key, operand);
    }

    pub fn merge_cf_id(&mut self, cf_id: u32, key: impl Into<Slice>, operand: impl Into<Slice>) {
        self.push(
            cf_id,
            WriteOp::Merge {
                key: key.into(),
                operand: operand.into(),
            },
        );
    }

    /// Get all operations
    #[inline]
    pub fn ops(&self) -> &[(u32, WriteOp)] {
        &self.ops
    }

    /// Number of operations in the batch
    #[inline]
    pub fn count(&self) -> usize {
        self.ops.len()
    }

    /// Clear all operations
    pub fn clear(&mut self) {
        self.ops.clear();
        self.data_size = 0;
        self.error = None;
    }

    /// Approximate memory usage in bytes
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Check if batch is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Encode as one WAL record starting at `sequence`
    pub fn encode(&self, sequence: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BATCH_HEADER_SIZE + self.data_size + self.ops.len() * 13);
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&(self.ops.len() as u32).to_le_bytes());

        for (cf_id, op) in &self.ops {
            buf.push(op.value_type() as u8);
            buf.extend_from_slice(&cf_id.to_le_bytes());
            let key = op.key().data();
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(key);
            match op {
                WriteOp::Put { value: v, .. } | WriteOp::Merge { operand: v, .. } => {
                    buf.extend_from_slice(&(v.size() as u32).to_le_bytes());
                    buf.extend_from_slice(v.data());
                },
                WriteOp::Delete { .. } => {},
            }
        }

        buf
    }

    /// Decode a WAL record into its base sequence and batch
    pub fn decode(data: &[u8]) -> Result<(u64, WriteBatch)> {
        if data.len() < BATCH_HEADER_SIZE {
            return Err(Status::corruption("WriteBatch record too small"));
        }
        let sequence = u64::from_le_bytes(fixed(&data[0..8]));
        let count = u32::from_le_bytes(fixed(&data[8..12])) as usize;

        let mut batch = WriteBatch::with_capacity(count.min(data.len()));
        let mut pos = BATCH_HEADER_SIZE;
        for _ in 0..count {
            let value_type = ValueType::from_u8(take(data, &mut pos, 1)?[0])?;
            let cf_id = u32::from_le_bytes(fixed(take(data, &mut pos, 4)?));
            let key = take_length_prefixed(data, &mut pos)?;
            match value_type {
                ValueType::Value => {
                    let value = take_length_prefixed(data, &mut pos)?;
                    batch.put_cf_id(cf_id, key, value);
                },
                ValueType::Merge => {
                    let operand = take_length_prefixed(data, &mut pos)?;
                    batch.merge_cf_id(cf_id, key, operand);
                },
                ValueType::Deletion => batch.delete_cf_id(cf_id, key),
            }
        }

        if pos != data.len() {
            return Err(Status::corruption("WriteBatch record has trailing bytes"));
        }
        Ok((sequence, batch))
    }
}

fn fixed<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    out
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| Status::corruption("WriteBatch record truncated"))?;
    let out = &data[*pos..end];
    *pos = end;
    Ok(out)
}

fn take_length_prefixed(data: &[u8], pos: &mut usize) -> Result<Slice> {
    let len = u32::from_le_bytes(fixed(take(data, pos, 4)?)) as usize;
    Ok(Slice::from(take(data, pos, len)?))
}
