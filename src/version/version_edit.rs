use crate::util::{Result, Slice, Status};

/// Metadata for a single table file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaData {
    /// File number (used in filename: {number}.sst)
    pub number: u64,
    /// File size in bytes
    pub file_size: u64,
    pub num_entries: u64,
    /// Smallest user key in this file
    pub smallest: Slice,
    /// Largest user key in this file
    pub largest: Slice,
}

impl FileMetaData {
    pub fn new(number: u64, file_size: u64, num_entries: u64, smallest: Slice, largest: Slice) -> Self {
        FileMetaData {
            number,
            file_size,
            num_entries,
            smallest,
            largest,
        }
    }
}

/// Column family creation as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewColumnFamily {
    pub id: u32,
    pub name: String,
    /// `ColumnFamilyOptions` serialized as JSON
    pub options: String,
}

/// A VersionEdit is one atomic change to the persisted database state
///
/// Every manifest record is exactly one encoded edit. An edit may carry any
/// mix of column family creations and drops, table files added by a flush,
/// per column family flush progress and the global counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VersionEdit {
    /// Next file number to use
    pub next_file_number: Option<u64>,
    /// Next column family id to allocate
    pub next_cf_id: Option<u32>,
    /// Last sequence number
    pub last_sequence: Option<u64>,
    /// Files to add: (cf_id, file_metadata)
    pub new_files: Vec<(u32, FileMetaData)>,
    /// Highest sequence persisted in table files: (cf_id, sequence)
    pub flushed_sequences: Vec<(u32, u64)>,
    /// Column Families to create
    pub created_column_families: Vec<NewColumnFamily>,
    /// Column Families to drop: cf_id
    pub dropped_column_families: Vec<u32>,
}

const TAG_NEXT_FILE_NUMBER: u8 = 1;
const TAG_NEXT_CF_ID: u8 = 2;
const TAG_LAST_SEQUENCE: u8 = 3;
const TAG_NEW_FILE: u8 = 4;
const TAG_FLUSHED_SEQUENCE: u8 = 5;
const TAG_CREATE_CF: u8 = 6;
const TAG_DROP_CF: u8 = 7;

impl VersionEdit {
    pub fn new() -> Self {
        VersionEdit::default()
    }

    pub fn set_next_file_number(&mut self, num: u64) {
        self.next_file_number = Some(num);
    }

    pub fn set_next_cf_id(&mut self, id: u32) {
        self.next_cf_id = Some(id);
    }

    pub fn set_last_sequence(&mut self, seq: u64) {
        self.last_sequence = Some(seq);
    }

    pub fn add_file(&mut self, cf_id: u32, file: FileMetaData) {
        self.new_files.push((cf_id, file));
    }

    pub fn set_flushed_sequence(&mut self, cf_id: u32, seq: u64) {
        self.flushed_sequences.push((cf_id, seq));
    }

    pub fn create_column_family(&mut self, id: u32, name: String, options: String) {
        self.created_column_families
            .push(NewColumnFamily { id, name, options });
    }

    pub fn drop_column_family(&mut self, cf_id: u32) {
        self.dropped_column_families.push(cf_id);
    }

    /// Encode VersionEdit to bytes for MANIFEST file
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        if let Some(num) = self.next_file_number {
            buf.push(TAG_NEXT_FILE_NUMBER);
            buf.extend_from_slice(&num.to_le_bytes());
        }

        if let Some(id) = self.next_cf_id {
            buf.push(TAG_NEXT_CF_ID);
            buf.extend_from_slice(&id.to_le_bytes());
        }

        if let Some(seq) = self.last_sequence {
            buf.push(TAG_LAST_SEQUENCE);
            buf.extend_from_slice(&seq.to_le_bytes());
        }

        // Creations come first so that files and progress in the same edit
        // can refer to the new column family.
        for cf in &self.created_column_families {
            buf.push(TAG_CREATE_CF);
            buf.extend_from_slice(&cf.id.to_le_bytes());
            put_length_prefixed(&mut buf, cf.name.as_bytes());
            put_length_prefixed(&mut buf, cf.options.as_bytes());
        }

        for (cf_id, file) in &self.new_files {
            buf.push(TAG_NEW_FILE);
            buf.extend_from_slice(&cf_id.to_le_bytes());
            buf.extend_from_slice(&file.number.to_le_bytes());
            buf.extend_from_slice(&file.file_size.to_le_bytes());
            buf.extend_from_slice(&file.num_entries.to_le_bytes());
            put_length_prefixed(&mut buf, file.smallest.data());
            put_length_prefixed(&mut buf, file.largest.data());
        }

        for (cf_id, seq) in &self.flushed_sequences {
            buf.push(TAG_FLUSHED_SEQUENCE);
            buf.extend_from_slice(&cf_id.to_le_bytes());
            buf.extend_from_slice(&seq.to_le_bytes());
        }

        for cf_id in &self.dropped_column_families {
            buf.push(TAG_DROP_CF);
            buf.extend_from_slice(&cf_id.to_le_bytes());
        }

        buf
    }

    /// Decode VersionEdit from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut edit = VersionEdit::new();
        let mut input = Decoder { data, pos: 0 };

        while !input.is_empty() {
            let tag = input.u8()?;
            match tag {
                TAG_NEXT_FILE_NUMBER => edit.set_next_file_number(input.u64()?),
                TAG_NEXT_CF_ID => edit.set_next_cf_id(input.u32()?),
                TAG_LAST_SEQUENCE => edit.set_last_sequence(input.u64()?),
                TAG_NEW_FILE => {
                    let cf_id = input.u32()?;
                    let number = input.u64()?;
                    let file_size = input.u64()?;
                    let num_entries = input.u64()?;
                    let smallest = Slice::from(input.length_prefixed()?);
                    let largest = Slice::from(input.length_prefixed()?);
                    edit.add_file(
                        cf_id,
                        FileMetaData::new(number, file_size, num_entries, smallest, largest),
                    );
                },
                TAG_FLUSHED_SEQUENCE => {
                    let cf_id = input.u32()?;
                    let seq = input.u64()?;
                    edit.set_flushed_sequence(cf_id, seq);
                },
                TAG_CREATE_CF => {
                    let id = input.u32()?;
                    let name = input.string()?;
                    let options = input.string()?;
                    edit.create_column_family(id, name, options);
                },
                TAG_DROP_CF => edit.drop_column_family(input.u32()?),
                _ => {
                    return Err(Status::corruption(format!(
                        "Unknown tag in VersionEdit: {tag}"
                    )));
                },
            }
        }

        Ok(edit)
    }
}

fn put_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Status::corruption("VersionEdit truncated"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String> {
        String::from_utf8(self.length_prefixed()?.to_vec())
            .map_err(|_| Status::corruption("Invalid UTF-8 in VersionEdit"))
    }
}
