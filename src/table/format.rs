//! Table file format
//!
//! A table file holds the sorted contents of one flushed memtable:
//!
//! - Body: every entry in internal key order, compressed as a whole
//! - Footer (fixed 29 bytes at the end)
//!
//! Entry format (before compression):
//! - User key length (4 bytes) + user key
//! - Sequence number (8 bytes)
//! - Value type (1 byte)
//! - Value length (4 bytes) + value
//!
//! Footer format:
//! - Number of entries (8 bytes)
//! - Uncompressed body size (8 bytes)
//! - Compression type (1 byte)
//! - CRC32 of the stored body (4 bytes)
//! - Magic number (8 bytes: 0x63667374_6f726531)
//!
//! All integers are little endian.
use crate::{
    compression::CompressionType,
    memtable::{InternalKey, ValueType},
    util::{Result, Slice, Status},
};

pub const FOOTER_SIZE: usize = 29;

pub const MAGIC_NUMBER: u64 = 0x6366_7374_6f72_6531;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub num_entries: u64,
    pub raw_size: u64,
    pub compression: CompressionType,
    pub checksum: u32,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.num_entries.to_le_bytes());
        buf[8..16].copy_from_slice(&self.raw_size.to_le_bytes());
        buf[16] = self.compression as u8;
        buf[17..21].copy_from_slice(&self.checksum.to_le_bytes());
        buf[21..29].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Status::corruption("Table footer has wrong size"));
        }
        let magic = u64::from_le_bytes(read_array(&data[21..29]));
        if magic != MAGIC_NUMBER {
            return Err(Status::corruption("Bad table magic number"));
        }

        Ok(Footer {
            num_entries: u64::from_le_bytes(read_array(&data[0..8])),
            raw_size: u64::from_le_bytes(read_array(&data[8..16])),
            compression: CompressionType::from_u8(data[16])?,
            checksum: u32::from_le_bytes(read_array(&data[17..21])),
        })
    }
}

fn read_array<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    out
}

pub fn encode_entry(buf: &mut Vec<u8>, key: &InternalKey, value: &Slice) {
    let user_key = key.user_key().data();
    buf.extend_from_slice(&(user_key.len() as u32).to_le_bytes());
    buf.extend_from_slice(user_key);
    buf.extend_from_slice(&key.sequence().to_le_bytes());
    buf.push(key.value_type() as u8);
    buf.extend_from_slice(&(value.size() as u32).to_le_bytes());
    buf.extend_from_slice(value.data());
}

/// Decode the entry starting at `*pos`, advancing `pos` past it.
pub fn decode_entry(data: &bytes::Bytes, pos: &mut usize) -> Result<(InternalKey, Slice)> {
    let key_len = take_u32(data, pos)? as usize;
    let user_key = take_slice(data, pos, key_len)?;
    let sequence = u64::from_le_bytes(read_array(take_raw(data, pos, 8)?));
    let value_type = ValueType::from_u8(take_raw(data, pos, 1)?[0])?;
    let value_len = take_u32(data, pos)? as usize;
    let value = take_slice(data, pos, value_len)?;

    Ok((InternalKey::new(user_key, sequence, value_type), value))
}

fn take_raw<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| Status::corruption("Table entry truncated"))?;
    let out = &data[*pos..end];
    *pos = end;
    Ok(out)
}

fn take_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(take_raw(data, pos, 4)?)))
}

/// Zero-copy sub-slice of the decoded body
fn take_slice(data: &bytes::Bytes, pos: &mut usize, len: usize) -> Result<Slice> {
    let start = *pos;
    take_raw(data, pos, len)?;
    Ok(Slice::from(data.slice(start..start + len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_rejects_bad_magic() {
        let footer = Footer {
            num_entries: 3,
            raw_size: 100,
            compression: CompressionType::Lz4,
            checksum: 0xdead_beef,
        };
        let mut encoded = footer.encode();
        assert_eq!(Footer::decode(&encoded).unwrap(), footer);

        encoded[FOOTER_SIZE - 1] ^= 0xff;
        assert!(Footer::decode(&encoded).unwrap_err().is_corruption());
    }

    #[test]
    fn test_truncated_entry_is_corruption() {
        let mut buf = Vec::new();
        encode_entry(
            &mut buf,
            &InternalKey::new(Slice::from("key"), 9, ValueType::Value),
            &Slice::from("value"),
        );
        buf.truncate(buf.len() - 2);

        let data = bytes::Bytes::from(buf);
        let mut pos = 0;
        assert!(decode_entry(&data, &mut pos).unwrap_err().is_corruption());
    }
}
