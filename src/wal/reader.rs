use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read},
    path::Path,
};

use crate::{
    util::{Result, Status},
    wal::log_format::{BLOCK_SIZE, FragmentHeader, HEADER_SIZE, RecordType},
};

enum Fragment {
    Data(RecordType, Vec<u8>),
    /// The file ends inside a header or payload
    Truncated,
    Eof,
}

/// Reads records written by [`crate::wal::Writer`]
///
/// A record whose fragments are cut off by the end of the file is an append
/// that never completed; the reader stops there and reports it through
/// [`Reader::truncated_tail`]. A checksum mismatch or an out-of-order fragment
/// is corruption.
pub struct Reader {
    file: BufReader<File>,
    /// Current position in file
    offset: u64,
    truncated_tail: bool,
}

impl Reader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Status::io_error(format!(
                "Failed to open log file {}: {e}",
                path.as_ref().display()
            ))
        })?;

        Ok(Reader {
            file: BufReader::new(file),
            offset: 0,
            truncated_tail: false,
        })
    }

    /// Read the next record, or `None` at the end of the log
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut record: Option<Vec<u8>> = None;

        loop {
            let (record_type, payload) = match self.read_fragment()? {
                Fragment::Data(t, p) => (t, p),
                Fragment::Truncated => {
                    self.truncated_tail = true;
                    return Ok(None);
                },
                Fragment::Eof => {
                    if record.is_some() {
                        self.truncated_tail = true;
                    }
                    return Ok(None);
                },
            };

            match (record_type, record.as_mut()) {
                (RecordType::Full, None) => return Ok(Some(payload)),
                (RecordType::First, None) => record = Some(payload),
                (RecordType::Middle, Some(buf)) => buf.extend_from_slice(&payload),
                (RecordType::Last, Some(buf)) => {
                    buf.extend_from_slice(&payload);
                    return Ok(record);
                },
                (t, _) => {
                    return Err(Status::corruption(format!(
                        "Unexpected {t:?} fragment at offset {}",
                        self.offset
                    )));
                },
            }
        }
    }

    fn read_fragment(&mut self) -> Result<Fragment> {
        let block_offset = (self.offset % BLOCK_SIZE as u64) as usize;
        let leftover = BLOCK_SIZE - block_offset;
        if leftover < HEADER_SIZE {
            let mut padding = vec![0u8; leftover];
            if self.read_full(&mut padding)? < leftover {
                return Ok(Fragment::Eof);
            }
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        match self.read_full(&mut header_buf)? {
            0 => return Ok(Fragment::Eof),
            n if n < HEADER_SIZE => return Ok(Fragment::Truncated),
            _ => {},
        }

        let header = FragmentHeader::decode(&header_buf).ok_or_else(|| {
            Status::corruption(format!("Invalid log fragment header at offset {}", self.offset))
        })?;

        let mut payload = vec![0u8; header.length as usize];
        if self.read_full(&mut payload)? < payload.len() {
            return Ok(Fragment::Truncated);
        }

        if !header.verify(&payload) {
            return Err(Status::corruption(format!(
                "Log checksum mismatch at offset {}",
                self.offset
            )));
        }

        Ok(Fragment::Data(header.record_type, payload))
    }

    /// Fill `buf` as far as the file allows; returns the bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Status::io_error(format!("Log read failed: {e}"))),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    /// Whether the log ended in the middle of a record
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}
