//! Uncompressed ZIP archive encoder
//!
//! Packs a list of named byte buffers into a single ZIP archive using the
//! "store" method (method 0, no compression). The whole container is written
//! by hand: local file headers, central directory, end-of-central-directory
//! record, and the CRC-32 checksums ZIP requires per entry.
//!
//! Archive layout:
//! ```text
//! [local header + name + data]   per entry, in input order
//! [central directory record]     per entry, mirroring the local headers
//! [end of central directory]     22-byte trailer
//! ```

use thiserror::Error;

const LOCAL_HEADER_SIG: u32 = 0x0403_4B50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4B50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_DIR_ENTRY_LEN: usize = 46;
const END_OF_CENTRAL_DIR_LEN: usize = 22;

/// Minimum ZIP version needed to extract a stored entry (2.0).
const VERSION_STORE: u16 = 20;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("archive must contain at least one entry")]
    Empty,

    #[error("entry name {name:?} is {len} bytes encoded, limit is 65535")]
    NameTooLong { name: String, len: usize },

    #[error("archive holds {0} entries, limit is 65535")]
    TooManyEntries(usize),

    #[error("archive would exceed the 4 GiB limit of the store format")]
    TooLarge,
}

/// One file to be stored in the archive.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub filename: String,
    pub data: Vec<u8>,
}

impl ZipEntry {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

/// CRC-32 lookup table for the reflected polynomial 0xEDB88320.
const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut crc = n as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                0xEDB8_8320 ^ (crc >> 1)
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[n] = crc;
        n += 1;
    }
    table
}

/// CRC-32 of `data` as used by ZIP (seed and final XOR 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC_TABLE[index] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}

/// Exact byte length `write_zip` would produce for `entries`.
///
/// Pure arithmetic, kept in lockstep with the writer: every entry costs its
/// data plus a 30-byte local header and a 46-byte central record, each
/// carrying one copy of the name; the trailer is a flat 22 bytes.
pub fn zip_size(entries: &[ZipEntry]) -> usize {
    let per_entry: usize = entries
        .iter()
        .map(|e| {
            LOCAL_HEADER_LEN + CENTRAL_DIR_ENTRY_LEN + 2 * e.filename.len() + e.data.len()
        })
        .sum();
    per_entry + END_OF_CENTRAL_DIR_LEN
}

/// Serialize `entries` into a single ZIP archive.
///
/// Entries are stored uncompressed in input order. Fails on an empty entry
/// list; an archive with nothing in it is a caller bug, not a no-op.
pub fn write_zip(entries: &[ZipEntry]) -> Result<Vec<u8>, ArchiveError> {
    if entries.is_empty() {
        return Err(ArchiveError::Empty);
    }
    // The end record declares the entry count in a u16.
    if entries.len() > u16::MAX as usize {
        return Err(ArchiveError::TooManyEntries(entries.len()));
    }
    for entry in entries {
        if entry.filename.len() > u16::MAX as usize {
            return Err(ArchiveError::NameTooLong {
                name: truncate_for_error(&entry.filename),
                len: entry.filename.len(),
            });
        }
    }
    let total = zip_size(entries);
    if total > u32::MAX as usize {
        return Err(ArchiveError::TooLarge);
    }

    let mut buf = Vec::with_capacity(total);
    let mut local_offsets = Vec::with_capacity(entries.len());
    let mut checksums = Vec::with_capacity(entries.len());

    for entry in entries {
        local_offsets.push(buf.len() as u32);
        let crc = crc32(&entry.data);
        checksums.push(crc);

        put_u32(&mut buf, LOCAL_HEADER_SIG);
        put_u16(&mut buf, VERSION_STORE); // version needed
        put_u16(&mut buf, 0); // general purpose flags
        put_u16(&mut buf, 0); // method: store
        put_u16(&mut buf, 0); // mod time
        put_u16(&mut buf, 0); // mod date
        put_u32(&mut buf, crc);
        put_u32(&mut buf, entry.data.len() as u32); // compressed size
        put_u32(&mut buf, entry.data.len() as u32); // uncompressed size
        put_u16(&mut buf, entry.filename.len() as u16);
        put_u16(&mut buf, 0); // extra field length
        buf.extend_from_slice(entry.filename.as_bytes());
        buf.extend_from_slice(&entry.data);
    }

    let central_start = buf.len() as u32;
    for (i, entry) in entries.iter().enumerate() {
        put_u32(&mut buf, CENTRAL_DIR_SIG);
        put_u16(&mut buf, VERSION_STORE); // version made by
        put_u16(&mut buf, VERSION_STORE); // version needed
        put_u16(&mut buf, 0); // flags
        put_u16(&mut buf, 0); // method
        put_u16(&mut buf, 0); // mod time
        put_u16(&mut buf, 0); // mod date
        put_u32(&mut buf, checksums[i]);
        put_u32(&mut buf, entry.data.len() as u32);
        put_u32(&mut buf, entry.data.len() as u32);
        put_u16(&mut buf, entry.filename.len() as u16);
        put_u16(&mut buf, 0); // extra field length
        put_u16(&mut buf, 0); // comment length
        put_u16(&mut buf, 0); // disk number start
        put_u16(&mut buf, 0); // internal attributes
        put_u32(&mut buf, 0); // external attributes
        put_u32(&mut buf, local_offsets[i]);
        buf.extend_from_slice(entry.filename.as_bytes());
    }
    let central_size = buf.len() as u32 - central_start;

    put_u32(&mut buf, END_OF_CENTRAL_DIR_SIG);
    put_u16(&mut buf, 0); // this disk
    put_u16(&mut buf, 0); // disk with central directory
    put_u16(&mut buf, entries.len() as u16); // entries on this disk
    put_u16(&mut buf, entries.len() as u16); // entries total
    put_u32(&mut buf, central_size);
    put_u32(&mut buf, central_start);
    put_u16(&mut buf, 0); // comment length

    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn truncate_for_error(name: &str) -> String {
    name.chars().take(64).collect()
}
