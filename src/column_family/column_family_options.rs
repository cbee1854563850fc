use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    compression::CompressionType,
    merge::MergeOperator,
    util::{Result, Status},
};

/// Options for a specific Column Family
///
/// Each column family can have different configuration for:
/// - Write buffer size (MemTable size before flush)
/// - Compression type (for table files)
/// - Merge operator (required before `merge` writes are accepted)
///
/// Everything except the merge operator is persisted in the manifest as
/// JSON. The merge operator must be supplied again on every open.
///
/// # Example
///
/// ```ignore
/// use cfstore::{ColumnFamilyOptions, CompressionType};
///
/// let options = ColumnFamilyOptions {
///     write_buffer_size: 8 * 1024 * 1024,  // 8MB
///     compression_type: CompressionType::Lz4,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnFamilyOptions {
    /// Size of write buffer (MemTable) in bytes before flushing to disk
    /// Default: 4MB
    pub write_buffer_size: usize,

    /// Compression type for table files
    /// Default: Snappy
    pub compression_type: CompressionType,

    #[serde(skip)]
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl ColumnFamilyOptions {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Status::corruption(format!("Invalid column family options: {e}")))
    }
}

impl Default for ColumnFamilyOptions {
    fn default() -> Self {
        ColumnFamilyOptions {
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            compression_type: CompressionType::Snappy,
            merge_operator: None,
        }
    }
}

impl fmt::Debug for ColumnFamilyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamilyOptions")
            .field("write_buffer_size", &self.write_buffer_size)
            .field("compression_type", &self.compression_type)
            .field(
                "merge_operator",
                &self.merge_operator.as_ref().map(|op| op.name().to_string()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::CounterMerge;

    #[test]
    fn test_json_skips_merge_operator() {
        let options = ColumnFamilyOptions {
            write_buffer_size: 1024,
            compression_type: CompressionType::Lz4,
            merge_operator: Some(Arc::new(CounterMerge)),
        };

        let json = options.to_json().unwrap();
        assert!(!json.contains("merge"));

        let decoded = ColumnFamilyOptions::from_json(&json).unwrap();
        assert_eq!(decoded.write_buffer_size, 1024);
        assert_eq!(decoded.compression_type, CompressionType::Lz4);
        assert!(decoded.merge_operator.is_none());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let decoded = ColumnFamilyOptions::from_json("{}").unwrap();
        assert_eq!(decoded.write_buffer_size, 4 * 1024 * 1024);
        assert!(ColumnFamilyOptions::from_json("not json").unwrap_err().is_corruption());
    }

    #[test]
    fn test_debug_names_operator() {
        let options = ColumnFamilyOptions {
            merge_operator: Some(Arc::new(CounterMerge)),
            ..Default::default()
        };
        assert!(format!("{options:?}").contains("CounterMerge"));
    }
}
