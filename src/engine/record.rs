//! The on-disk record format (§3, §4.A): a 32-byte header followed by the
//! raw key and value bytes, checksummed with CRC-64/ECMA over everything
//! past the checksum field itself.

use crate::error::{Error, Result};
use std::io::Read;

/// Size of the fixed header: checksum(8) + created(8) + expired(8) +
/// key_len(4) + value_len(4).
pub const HEADER_LEN: usize = 32;

static CRC: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);

/// A single decoded record. `value` is empty iff the record is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub created: i64,
    pub expired: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(created: i64, expired: i64, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { created, expired, key, value }
    }

    pub fn tombstone(created: i64, key: Vec<u8>) -> Self {
        Self { created, expired: 0, key, value: Vec::new() }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expired != 0 && self.expired <= now_millis
    }

    /// Total on-disk size of this record once encoded.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.key.len() + self.value.len()
    }

    /// Encodes the record, computing and placing the CRC over bytes [8..).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];

        buf[8..16].copy_from_slice(&self.created.to_le_bytes());
        buf[16..24].copy_from_slice(&self.expired.to_le_bytes());
        buf[24..28].copy_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf[28..32].copy_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf[32..32 + self.key.len()].copy_from_slice(&self.key);
        buf[32 + self.key.len()..].copy_from_slice(&self.value);

        let checksum = CRC.checksum(&buf[8..]);
        buf[0..8].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Decodes a record from an exact buffer (header + key + value, no
    /// trailing bytes). Fails with `MalformedRecord` if the buffer is
    /// shorter than the header or the declared lengths demand, and
    /// `ChecksumMismatch` if the recomputed CRC disagrees.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::MalformedRecord(format!(
                "buffer of {} bytes shorter than {HEADER_LEN}-byte header",
                data.len()
            )));
        }

        let stored_checksum = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let created = i64::from_le_bytes(data[8..16].try_into().unwrap());
        let expired = i64::from_le_bytes(data[16..24].try_into().unwrap());
        let key_len = u32::from_le_bytes(data[24..28].try_into().unwrap()) as usize;
        let value_len = u32::from_le_bytes(data[28..32].try_into().unwrap()) as usize;

        let total = HEADER_LEN + key_len + value_len;
        if data.len() < total {
            return Err(Error::MalformedRecord(format!(
                "buffer of {} bytes shorter than declared record size {total}",
                data.len()
            )));
        }

        let computed_checksum = CRC.checksum(&data[8..total]);
        if computed_checksum != stored_checksum {
            return Err(Error::ChecksumMismatch(format!(
                "stored {stored_checksum:#x}, computed {computed_checksum:#x}"
            )));
        }

        let key = data[32..32 + key_len].to_vec();
        let value = data[32 + key_len..total].to_vec();

        Ok(Self { created, expired, key, value })
    }

    /// Streaming decode: reads exactly the header, then exactly
    /// `key_len + value_len` more bytes, from `r`. Returns `Ok(None)` on a
    /// clean end-of-file (zero bytes read at a record boundary), and
    /// `Err(MalformedRecord)` when a short read leaves a partial record at
    /// the tail (the two must never be confused, §9).
    pub fn decode_stream<R: Read>(r: &mut R) -> Result<Option<(Self, usize)>> {
        let mut header = [0u8; HEADER_LEN];
        let header_read = read_fill(r, &mut header)?;
        if header_read == 0 {
            return Ok(None);
        }
        if header_read < HEADER_LEN {
            return Err(Error::MalformedRecord(format!(
                "truncated header: got {header_read} of {HEADER_LEN} bytes"
            )));
        }

        let key_len = u32::from_le_bytes(header[24..28].try_into().unwrap()) as usize;
        let value_len = u32::from_le_bytes(header[28..32].try_into().unwrap()) as usize;

        let mut body = vec![0u8; key_len + value_len];
        let body_read = read_fill(r, &mut body)?;
        if body_read < body.len() {
            return Err(Error::MalformedRecord(format!(
                "truncated body: got {body_read} of {} bytes",
                body.len()
            )));
        }

        let mut full = Vec::with_capacity(HEADER_LEN + body.len());
        full.extend_from_slice(&header);
        full.extend_from_slice(&body);

        let record = Self::decode(&full)?;
        let consumed = full.len();
        Ok(Some((record, consumed)))
    }
}

/// Fills `buf` from `r`, looping across short reads, stopping only at a
/// clean EOF (`read` returning `0`). Returns the number of bytes filled,
/// which may be less than `buf.len()` on EOF.
fn read_fill<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
