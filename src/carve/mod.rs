//! Forensic carving of PK-format archive structure out of a [`crate::chunk_stream::ChunkStream`].
//!
//! `EntryDecoder`, `UnknownCollector` and `Carver` share this module because
//! they are never used independently — the carver owns the only
//! `UnknownCollector` instance (see `DESIGN.md`).

pub mod carver;
pub mod entry_decoder;
pub mod fragment;
pub mod unknown_collector;

pub use carver::Carver;
pub use fragment::{ArchiveFragment, DirEntryJson, FileEntryJson, UnknownFragment};

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::chunk_stream::ChunkStream;
use crate::error::SalvageError;
use crate::inflate::Inflater;

/// One file entry's byte range to be repacked, named the way
/// `original_source/procreate_repair/deflate.py`'s JSON manifest entries are:
/// `{file, start, end}` minus the source chunk-directory field, since this
/// crate addresses everything through one `ChunkStream`.
#[derive(Debug, Clone)]
pub struct FileEntryRange {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// Rebuilds a fresh, standard-readable ZIP archive out of a set of recovered
/// file-entry byte ranges, inflating each one and re-compressing it with
/// [`zip::ZipWriter`] rather than only exploding entries onto the filesystem
/// as loose files. See `SPEC_FULL.md` §11.
pub fn repack_fragment(
    stream: &mut ChunkStream,
    entries: &[FileEntryRange],
    strict: bool,
) -> Result<Vec<u8>, SalvageError> {
    let inflater = if strict {
        Inflater::strict()
    } else {
        Inflater::lenient()
    };

    let buffer = Cursor::new(Vec::new());
    let mut writer = ZipWriter::new(buffer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        let data = inflater.inflate(stream, entry.start, entry.end)?;
        writer
            .start_file(&entry.name, options)
            .map_err(|err| SalvageError::CorruptArchiveFragment {
                offset: entry.start,
                reason: err.to_string(),
            })?;
        writer
            .write_all(&data)
            .map_err(|err| SalvageError::Inflate {
                offset: entry.start,
                source: err,
            })?;
    }

    let cursor = writer
        .finish()
        .map_err(|err| SalvageError::CorruptArchiveFragment {
            offset: 0,
            reason: err.to_string(),
        })?;
    Ok(cursor.into_inner())
}
