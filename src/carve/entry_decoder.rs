//! Decodes one PK-format record given the `ChunkStream` positioned at its
//! signature, per the field offsets in `SPEC_FULL.md` §6.
//!
//! Grounded on `forensicxlab-exhume_body/src/aff4.rs`'s `parse_central_directory`:
//! manual little-endian field extraction, absolute seeks rather than a parser
//! combinator.

use std::io::{self, Read};

use crate::chunk_stream::ChunkStream;

fn read_u16le(stream: &mut ChunkStream) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32le(stream: &mut ChunkStream) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_name(stream: &mut ChunkStream, len: u16) -> io::Result<String> {
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// A decoded local file header (signature `50 4B 03 04`).
#[derive(Debug, Clone)]
pub struct DecodedLocalFileHeader {
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub compressed_size: u32,
    pub name: String,
    /// Absolute offset of the first byte after the record, including its payload.
    pub end: u64,
}

/// Reads a local file header. `sig_offset` is the absolute offset of the
/// 4-byte signature; the stream's position on return is undefined until the
/// caller re-seeks, but `end` gives the correct resume point.
pub fn decode_local_file_header(
    stream: &mut ChunkStream,
    sig_offset: u64,
) -> io::Result<DecodedLocalFileHeader> {
    stream.seek_mode((sig_offset + 10) as i64, 0)?;
    let last_mod_time = read_u16le(stream)?;
    let last_mod_date = read_u16le(stream)?;

    stream.seek_mode((sig_offset + 18) as i64, 0)?;
    let compressed_size = read_u32le(stream)?;

    stream.seek_mode((sig_offset + 26) as i64, 0)?;
    let name_len = read_u16le(stream)?;
    let extra_len = read_u16le(stream)?;
    let name = read_name(stream, name_len)?;

    stream.seek_mode(extra_len as i64, 1)?;
    stream.seek_mode(compressed_size as i64, 1)?;
    let end = stream.offset();

    Ok(DecodedLocalFileHeader {
        last_mod_time,
        last_mod_date,
        compressed_size,
        name,
        end,
    })
}

/// A decoded central directory header (signature `50 4B 01 02`).
#[derive(Debug, Clone)]
pub struct DecodedCentralDirHeader {
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub compressed_size: u32,
    pub name: String,
    pub relative_local_header_offset: u32,
    pub end: u64,
}

pub fn decode_central_dir_header(
    stream: &mut ChunkStream,
    sig_offset: u64,
) -> io::Result<DecodedCentralDirHeader> {
    stream.seek_mode((sig_offset + 12) as i64, 0)?;
    let last_mod_time = read_u16le(stream)?;
    let last_mod_date = read_u16le(stream)?;

    stream.seek_mode((sig_offset + 20) as i64, 0)?;
    let compressed_size = read_u32le(stream)?;

    stream.seek_mode((sig_offset + 28) as i64, 0)?;
    let name_len = read_u16le(stream)?;
    let extra_len = read_u16le(stream)?;
    let comment_len = read_u16le(stream)?;

    stream.seek_mode((sig_offset + 42) as i64, 0)?;
    let relative_local_header_offset = read_u32le(stream)?;

    stream.seek_mode((sig_offset + 46) as i64, 0)?;
    let name = read_name(stream, name_len)?;

    stream.seek_mode((extra_len as i64) + (comment_len as i64), 1)?;
    let end = stream.offset();

    Ok(DecodedCentralDirHeader {
        last_mod_time,
        last_mod_date,
        compressed_size,
        name,
        relative_local_header_offset,
        end,
    })
}

/// A decoded end-of-central-directory record (signature `50 4B 05 06`).
#[derive(Debug, Clone)]
pub struct DecodedEocd {
    pub total_entries: u16,
    pub dir_size: u32,
    pub dir_offset: u32,
    pub end: u64,
}

pub fn decode_eocd(stream: &mut ChunkStream, sig_offset: u64) -> io::Result<DecodedEocd> {
    stream.seek_mode((sig_offset + 10) as i64, 0)?;
    let total_entries = read_u16le(stream)?;
    let dir_size = read_u32le(stream)?;
    let dir_offset = read_u32le(stream)?;
    let comment_len = read_u16le(stream)?;

    stream.seek_mode(comment_len as i64, 1)?;
    let end = stream.offset();

    Ok(DecodedEocd {
        total_entries,
        dir_size,
        dir_offset,
        end,
    })
}
