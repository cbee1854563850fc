use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use tracing::warn;

use crate::{
    util::{Result, Status},
    wal::log_format::{BLOCK_SIZE, FragmentHeader, HEADER_SIZE, RecordType},
};

/// Appends records to a log file
///
/// A record that fails half-way is cut off again so the file ends on a
/// record boundary. If that is impossible, or a sync fails, the writer is
/// marked failed and refuses further records; the owner has to move on to a
/// new file.
pub struct Writer {
    file: File,
    /// Bytes in the file, including padding
    size: u64,
    /// Position inside the current block
    block_offset: usize,
    failed: bool,
    #[cfg(test)]
    faults: Faults,
}

/// Injected I/O failures
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Bytes that may still be written before writes start failing
    pub write_budget: Option<usize>,
    pub fail_truncate: bool,
}

impl Writer {
    /// Create a new, empty log file. Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| {
                Status::io_error(format!(
                    "Failed to create log file {}: {e}",
                    path.as_ref().display()
                ))
            })?;

        Ok(Writer {
            file,
            size: 0,
            block_offset: 0,
            failed: false,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Append one logical record. Returns the file offset it starts at.
    ///
    /// On error nothing of the record is left in the file, unless the writer
    /// has become [failed](Writer::is_failed).
    pub fn add_record(&mut self, data: &[u8]) -> Result<u64> {
        if self.failed {
            return Err(Status::io_error(
                "Log writer is unusable after an earlier failure",
            ));
        }

        let start = self.size;
        if let Err(e) = self.write_fragments(data) {
            self.discard_from(start);
            return Err(e);
        }
        Ok(start)
    }

    fn write_fragments(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data;
        let mut is_first = true;

        // An empty record still produces one zero-length Full fragment.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.write_raw(&vec![0u8; leftover])?;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = left.len().min(avail);
            let is_last = fragment_length == left.len();

            let (fragment, rest) = left.split_at(fragment_length);
            self.emit_fragment(RecordType::for_fragment(is_first, is_last), fragment)?;

            left = rest;
            is_first = false;
            if is_last {
                return Ok(());
            }
        }
    }

    /// Cut the file back to `offset`, the start of a record. The writer is
    /// marked failed if the file cannot be truncated.
    pub fn discard_from(&mut self, offset: u64) {
        match self.truncate(offset) {
            Ok(()) => {
                self.size = offset;
                self.block_offset = (offset % BLOCK_SIZE as u64) as usize;
            },
            Err(e) => {
                warn!(offset, error = %e, "failed to discard partial log record");
                self.failed = true;
            },
        }
    }

    fn emit_fragment(&mut self, record_type: RecordType, payload: &[u8]) -> Result<()> {
        debug_assert!(payload.len() <= 0xFFFF);

        let header = FragmentHeader::new(record_type, payload);
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(payload);
        self.write_raw(&buf)
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.write_bytes(buf)
            .map_err(|e| Status::io_error(format!("Log write failed: {e}")))?;
        self.size += buf.len() as u64;
        self.block_offset = (self.block_offset + buf.len()) % BLOCK_SIZE;
        Ok(())
    }

    #[cfg(not(test))]
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    #[cfg(test)]
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
        if let Some(budget) = self.faults.write_budget {
            if buf.len() > budget {
                self.file.write_all(&buf[..budget])?;
                self.faults.write_budget = Some(0);
                return Err(io::Error::other("injected write failure"));
            }
            self.faults.write_budget = Some(budget - buf.len());
        }
        self.file.write_all(buf)
    }

    #[cfg(not(test))]
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    #[cfg(test)]
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if self.faults.fail_truncate {
            return Err(io::Error::other("injected truncate failure"));
        }
        self.file.set_len(len)
    }

    #[cfg(test)]
    pub(crate) fn faults(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Flush written data to stable storage. A failed sync marks the writer
    /// failed: what reached the disk is unknown.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data().map_err(|e| {
            self.failed = true;
            Status::io_error(format!("Log sync failed: {e}"))
        })
    }

    /// Current size of the file in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// An append or sync failed and the file may end in a partial record
    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("size", &self.size)
            .field("block_offset", &self.block_offset)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_write_small_record() {
        let dir = TempDir::new().unwrap();
        let mut writer = Writer::create(dir.path().join("000001.log")).unwrap();

        let offset = writer.add_record(b"hello world").unwrap();
        assert_eq!(offset, 0);
        assert_eq!(writer.size(), (HEADER_SIZE + 11) as u64);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000001.log");
        Writer::create(&path).unwrap();
        assert!(Writer::create(&path).unwrap_err().is_io_error());
    }

    #[test]
    fn test_write_large_record_spans_blocks() {
        let dir = TempDir::new().unwrap();
        let mut writer = Writer::create(dir.path().join("000001.log")).unwrap();

        let large = vec![b'A'; BLOCK_SIZE * 2];
        writer.add_record(&large).unwrap();
        // Three fragments are needed for two blocks worth of payload.
        assert_eq!(writer.size(), (BLOCK_SIZE * 2 + 3 * HEADER_SIZE) as u64);
    }

    fn read_all(path: &Path) -> (Vec<Vec<u8>>, bool) {
        let mut reader = crate::wal::Reader::new(path).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.read_record().unwrap() {
            records.push(record);
        }
        (records, reader.truncated_tail())
    }

    #[test]
    fn test_partial_record_is_cut_off() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000001.log");
        let mut writer = Writer::create(&path).unwrap();
        writer.add_record(b"first").unwrap();
        let size = writer.size();

        // Header plus 10 payload bytes reach the file, then the write fails.
        writer.faults().write_budget = Some(HEADER_SIZE + 10);
        assert!(writer.add_record(&[b'x'; 100]).unwrap_err().is_io_error());
        assert!(!writer.is_failed());
        assert_eq!(writer.size(), size);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

        writer.faults().write_budget = None;
        writer.add_record(b"second").unwrap();
        writer.sync().unwrap();

        let (records, truncated) = read_all(&path);
        assert_eq!(records, vec![b"first".to_vec(), b"second".to_vec()]);
        assert!(!truncated);
    }

    #[test]
    fn test_writer_fails_when_partial_record_stays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000001.log");
        let mut writer = Writer::create(&path).unwrap();
        writer.add_record(b"first").unwrap();

        writer.faults().write_budget = Some(HEADER_SIZE + 10);
        writer.faults().fail_truncate = true;
        assert!(writer.add_record(&[b'x'; 100]).unwrap_err().is_io_error());
        assert!(writer.is_failed());

        writer.faults().write_budget = None;
        writer.faults().fail_truncate = false;
        assert!(writer.add_record(b"second").unwrap_err().is_io_error());

        // The torn record is the tail of the file, not garbage in the middle.
        let (records, truncated) = read_all(&path);
        assert_eq!(records, vec![b"first".to_vec()]);
        assert!(truncated);
    }
}
