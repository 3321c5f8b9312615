//! Index table parser for multi-stream archives.
//!
//! Both NWK and OVK archives start with the same header:
//!
//! ```text
//! i32            entry count
//! record[count]  12 bytes (NWK) or 16 bytes (OVK) each
//! ```
//!
//! A record is a run of little-endian `i32` fields: size, offset, sequence
//! id and, for OVK only, the original size. Records are not range checked
//! here; see [`IndexTable::descriptors`](super::IndexTable::descriptors).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, ErrorKind, Read};

use crate::error::{ExtractError, Result};

use super::structures::{ContainerKind, IndexRecord, IndexTable};

/// Size of the entry count that precedes the records.
pub const HEADER_SIZE: usize = 4;

/// Parse the header and index table of a multi-stream archive.
///
/// # Errors
///
/// - [`ExtractError::MalformedContainer`] if the entry count is not positive
///   (a header too short to hold the count reads as zero)
/// - [`ExtractError::TruncatedIndex`] if a record is cut short
/// - [`ExtractError::IndexReadFailed`] if the reader itself fails
pub fn parse_index<Rd: Read>(reader: &mut Rd, kind: ContainerKind) -> Result<IndexTable> {
    let unreadable = |source| ExtractError::IndexReadFailed { kind, source };

    let mut head = [0u8; HEADER_SIZE];
    let count = if read_full(reader, &mut head).map_err(unreadable)? == HEADER_SIZE {
        i32::from_le_bytes(head)
    } else {
        0
    };

    if count <= 0 || !kind.is_multi_stream() {
        return Err(ExtractError::MalformedContainer { kind, count });
    }

    let block_size = kind.record_size();
    let mut block = vec![0u8; block_size];
    let mut records = Vec::with_capacity((count as usize).min(1 << 16));

    for entry in 0..count as usize {
        let got = read_full(reader, &mut block).map_err(unreadable)?;
        if got != block_size {
            return Err(ExtractError::TruncatedIndex {
                kind,
                entry,
                expected: block_size,
                actual: got,
            });
        }
        records.push(decode_record(&block));
    }

    Ok(IndexTable::new(kind, records))
}

/// Number of header bytes that hold `count` records of `kind`.
pub fn index_len(kind: ContainerKind, count: i32) -> u64 {
    HEADER_SIZE as u64 + count.max(0) as u64 * kind.record_size() as u64
}

fn decode_record(block: &[u8]) -> IndexRecord {
    let mut cursor = Cursor::new(block);
    let mut field = || cursor.read_i32::<LittleEndian>().unwrap_or(0);

    // NWK records stop after the sequence id
    IndexRecord {
        size: field(),
        offset: field(),
        sequence_id: field(),
        original_size: field(),
    }
}

/// Read until `buf` is full or the reader reaches end of input.
fn read_full<Rd: Read>(reader: &mut Rd, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
