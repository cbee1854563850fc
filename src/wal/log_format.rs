/// Log file format shared by WAL segments and the MANIFEST
///
/// A log file is a sequence of 32KB blocks. A logical record is split into
/// one or more physical fragments so that no fragment crosses a block
/// boundary. When fewer than `HEADER_SIZE` bytes remain in a block, the
/// remainder is zero padded and the next fragment starts a new block.
///
/// Fragment format:
/// +----------+--------+-------+---------+
/// | Checksum | Length | Type  | Payload |
/// +----------+--------+-------+---------+
/// | 4 bytes  | 2 bytes| 1 byte| N bytes |
/// +----------+--------+-------+---------+
///
/// The checksum covers the type byte and the payload and is stored masked,
/// so that a log containing embedded checksums does not produce valid
/// checksums by accident.
use crc32fast::Hasher;

/// Block size is 32KB
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Header size: checksum(4) + length(2) + type(1) = 7 bytes
pub const HEADER_SIZE: usize = 7;

const MASK_DELTA: u32 = 0xa282_ead8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Complete record
    Full = 1,
    /// First fragment of a record
    First = 2,
    /// Middle fragment of a record
    Middle = 3,
    /// Last fragment of a record
    Last = 4,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }

    /// Type of a fragment given whether it starts and/or ends its record.
    pub fn for_fragment(is_first: bool, is_last: bool) -> Self {
        match (is_first, is_last) {
            (true, true) => RecordType::Full,
            (true, false) => RecordType::First,
            (false, true) => RecordType::Last,
            (false, false) => RecordType::Middle,
        }
    }
}

fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Masked CRC32 of a fragment's type byte and payload.
pub fn fragment_checksum(record_type: RecordType, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[record_type as u8]);
    hasher.update(payload);
    mask(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub checksum: u32,
    pub length: u16,
    pub record_type: RecordType,
}

impl FragmentHeader {
    pub fn new(record_type: RecordType, payload: &[u8]) -> Self {
        FragmentHeader {
            checksum: fragment_checksum(record_type, payload),
            length: payload.len() as u16,
            record_type,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        header[4..6].copy_from_slice(&self.length.to_le_bytes());
        header[6] = self.record_type as u8;
        header
    }

    /// Returns `None` when the type byte is unknown.
    pub fn decode(header: &[u8; HEADER_SIZE]) -> Option<Self> {
        let checksum = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let length = u16::from_le_bytes([header[4], header[5]]);
        let record_type = RecordType::from_u8(header[6])?;
        Some(FragmentHeader {
            checksum,
            length,
            record_type,
        })
    }

    pub fn verify(&self, payload: &[u8]) -> bool {
        self.checksum == fragment_checksum(self.record_type, payload)
    }
}
