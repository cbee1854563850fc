use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    util::{FileType, Result, Status, log_file_name, parse_file_name},
    wal::{Reader, Writer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Receives appends
    Active,
    /// Read-only; waits until every column family has flushed its data
    Sealed,
}

/// One WAL file and the range of sequence numbers it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSegment {
    pub number: u64,
    /// `(first, last)` sequence of the records in this segment, `None` if empty
    pub range: Option<(u64, u64)>,
    pub size: u64,
    pub state: SegmentState,
}

impl LogSegment {
    fn new(number: u64, state: SegmentState) -> Self {
        LogSegment {
            number,
            range: None,
            size: 0,
            state,
        }
    }

    fn extend(&mut self, first: u64, last: u64) {
        self.range = match self.range {
            None => Some((first, last)),
            Some((f, l)) => Some((f.min(first), l.max(last))),
        };
    }

    /// Every sequence in this segment is below `watermark`
    pub fn is_obsolete(&self, watermark: u64) -> bool {
        match self.range {
            None => true,
            Some((_, last)) => last < watermark,
        }
    }
}

/// Owns the chain of WAL segments shared by all column families
///
/// ```text
///  sealed (oldest first)                    active
/// [000003.log] [000007.log] [000012.log] -> [000015.log]
///      ↑
///  retired once min_unflushed_sequence() > its last sequence
/// ```
///
/// The manager does not know which column family owns which record; the
/// caller passes the cross-column-family watermark to [`WalManager::retire`].
pub struct WalManager {
    dir: PathBuf,
    /// `None` for read-only instances
    writer: Option<Writer>,
    active: Option<LogSegment>,
    sealed: VecDeque<LogSegment>,
    max_log_file_size: u64,
}

impl WalManager {
    /// Start a manager on top of recovered segments, creating a fresh active
    /// segment numbered `active_number`.
    pub fn open(
        dir: &Path,
        recovered: Vec<LogSegment>,
        active_number: u64,
        max_log_file_size: u64,
    ) -> Result<Self> {
        let mut manager = WalManager {
            dir: dir.to_path_buf(),
            writer: None,
            active: None,
            sealed: recovered
                .into_iter()
                .map(|mut s| {
                    s.state = SegmentState::Sealed;
                    s
                })
                .collect(),
            max_log_file_size,
        };
        manager.start_segment(active_number)?;
        Ok(manager)
    }

    /// A manager that only tracks recovered segments and rejects appends
    pub fn read_only(dir: &Path, recovered: Vec<LogSegment>) -> Self {
        WalManager {
            dir: dir.to_path_buf(),
            writer: None,
            active: None,
            sealed: recovered.into(),
            max_log_file_size: u64::MAX,
        }
    }

    fn segment_path(&self, number: u64) -> PathBuf {
        self.dir.join(log_file_name(number))
    }

    fn start_segment(&mut self, number: u64) -> Result<()> {
        let writer = Writer::create(self.segment_path(number))?;
        self.writer = Some(writer);
        self.active = Some(LogSegment::new(number, SegmentState::Active));
        debug!(segment = number, "started WAL segment");
        Ok(())
    }

    /// Append one record covering sequences `first..=last`
    pub fn append(&mut self, first: u64, last: u64, record: &[u8], sync: bool) -> Result<()> {
        let (writer, active) = match (self.writer.as_mut(), self.active.as_mut()) {
            (Some(w), Some(a)) => (w, a),
            _ => return Err(Status::not_supported("WAL is read-only")),
        };

        let start = writer.add_record(record)?;
        if sync {
            if let Err(e) = writer.sync() {
                writer.discard_from(start);
                return Err(e);
            }
        }
        active.extend(first, last);
        active.size = writer.size();
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.sync(),
            None => Ok(()),
        }
    }

    /// The active segment's writer failed and takes no more records until
    /// [`WalManager::roll`] replaces it
    pub fn is_failed(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| w.is_failed())
    }

    #[cfg(test)]
    pub(crate) fn active_writer(&mut self) -> Option<&mut Writer> {
        self.writer.as_mut()
    }

    /// The active segment has outgrown `max_log_file_size`
    pub fn needs_rollover(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.size >= self.max_log_file_size)
    }

    /// Seal the active segment and start `new_number` as the new active one.
    ///
    /// On failure the current segment stays active. A failed segment is
    /// sealed without a sync; it may end in a partial record, which replay
    /// ignores.
    pub fn roll(&mut self, new_number: u64) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Status::not_supported("WAL is read-only"));
        };
        if !writer.is_failed() {
            writer.sync()?;
        }
        let next = Writer::create(self.segment_path(new_number))?;

        self.writer = Some(next);
        if let Some(mut sealed) = self
            .active
            .replace(LogSegment::new(new_number, SegmentState::Active))
        {
            sealed.state = SegmentState::Sealed;
            debug!(
                segment = sealed.number,
                size = sealed.size,
                range = ?sealed.range,
                next = new_number,
                "sealed WAL segment"
            );
            self.sealed.push_back(sealed);
        }
        Ok(())
    }

    /// Delete sealed segments whose sequences are all below `watermark`.
    ///
    /// A segment that cannot be deleted stays sealed and is tried again on
    /// the next call. Returns the numbers of the deleted segments.
    pub fn retire(&mut self, watermark: u64) -> Vec<u64> {
        let mut retired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.sealed.len());

        while let Some(segment) = self.sealed.pop_front() {
            if !segment.is_obsolete(watermark) {
                kept.push_back(segment);
                continue;
            }

            let path = self.segment_path(segment.number);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(segment = segment.number, watermark, "retired WAL segment");
                    retired.push(segment.number);
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    retired.push(segment.number);
                },
                Err(e) => {
                    warn!(
                        segment = segment.number,
                        error = %e,
                        "failed to delete obsolete WAL segment, will retry"
                    );
                    kept.push_back(segment);
                },
            }
        }

        self.sealed = kept;
        retired
    }

    /// Aggregate size of every segment on disk
    pub fn total_size(&self) -> u64 {
        self.sealed.iter().map(|s| s.size).sum::<u64>()
            + self.active.as_ref().map_or(0, |a| a.size)
    }

    /// Last sequence of the oldest segment that still holds data
    pub fn oldest_live_sequence_bound(&self) -> Option<u64> {
        self.sealed
            .iter()
            .chain(self.active.iter())
            .find_map(|s| s.range.map(|(_, last)| last))
    }

    /// Sealed segments oldest first, followed by the active segment
    pub fn segments(&self) -> Vec<LogSegment> {
        self.sealed
            .iter()
            .chain(self.active.iter())
            .cloned()
            .collect()
    }

    pub fn active_number(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.number)
    }

    /// Replay every WAL segment in `dir`, oldest first.
    ///
    /// `apply` receives each record and returns the `(first, last)` sequence
    /// range it covers. The returned segments carry those ranges so that
    /// retention keeps working for the recovered data.
    pub fn replay<F>(dir: &Path, mut apply: F) -> Result<Vec<LogSegment>>
    where
        F: FnMut(&[u8]) -> Result<(u64, u64)>,
    {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(FileType::Log(number)) =
                entry.file_name().to_str().and_then(parse_file_name)
            {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();

        let mut segments = Vec::with_capacity(numbers.len());
        for number in numbers {
            let path = dir.join(log_file_name(number));
            let mut segment = LogSegment::new(number, SegmentState::Sealed);
            let mut reader = Reader::new(&path)?;
            let mut records = 0usize;

            while let Some(record) = reader.read_record()? {
                let (first, last) = apply(&record)?;
                segment.extend(first, last);
                records += 1;
            }
            if reader.truncated_tail() {
                warn!(segment = number, "ignoring incomplete record at end of WAL segment");
            }

            segment.size = fs::metadata(&path)?.len();
            debug!(segment = number, records, range = ?segment.range, "replayed WAL segment");
            segments.push(segment);
        }

        Ok(segments)
    }
}
