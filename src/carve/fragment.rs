//! Carver output types — the JSON shapes written to `partials.zips.json` and
//! `partials.unknown.json`, plus the mutable builder the [`super::carver::Carver`]
//! accumulates them into.
//!
//! Field names (`fid`, `ref`, `dir_count`, ...) are taken directly from
//! `original_source/procreate_repair/detect_zip.py`'s `__json_encode__` methods.

use serde::{Deserialize, Serialize};

use super::entry_decoder::{DecodedCentralDirHeader, DecodedEocd, DecodedLocalFileHeader};

/// One recovered local file entry, as carried inside a non-valid [`ArchiveFragment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntryJson {
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub fid: String,
    pub corrupt: i64,
}

/// One recovered central directory entry, as carried inside a non-valid [`ArchiveFragment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntryJson {
    pub name: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub offset: [i64; 2],
    pub corrupt: i64,
}

/// A tentative archive salvaged from the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveFragment {
    pub start: u64,
    pub end: u64,
    pub valid: bool,
    pub zip_start: Option<i64>,
    pub dir_start: Option<i64>,
    pub dir_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub files: Option<Vec<FileEntryJson>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dirs: Option<Vec<DirEntryJson>>,
}

/// A run of bytes matching no known signature.
#[derive(Debug, Clone, Serialize)]
pub struct UnknownFragment {
    pub start: u64,
    pub end: u64,
    #[serde(serialize_with = "as_hex")]
    pub magic: Vec<u8>,
    pub rollback: bool,
}

fn as_hex<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    serializer.serialize_str(&hex)
}

#[derive(Debug, Clone)]
struct RawFileEntry {
    start: u64,
    end: u64,
    name: String,
    date: u16,
    time: u16,
    corrupt: i64,
}

#[derive(Debug, Clone)]
struct RawDirEntry {
    start: u64,
    end: u64,
    name: String,
    date: u16,
    time: u16,
    relative_local_header_offset: u32,
    compressed_size: u32,
    corrupt: i64,
}

#[derive(Debug, Clone)]
struct EocdSummary {
    declared_entries: u16,
    dir_start: i64,
    archive_start: i64,
}

#[derive(Debug, Clone, Copy)]
enum LastEntry {
    None,
    File,
    Dir,
}

/// Mutable accumulator for one in-progress [`ArchiveFragment`]; owned exclusively by
/// the carver for the lifetime of one candidate archive.
#[derive(Debug, Clone)]
pub struct ArchiveFragmentBuilder {
    start: u64,
    end: u64,
    files: Vec<RawFileEntry>,
    dirs: Vec<RawDirEntry>,
    eocd: Option<EocdSummary>,
    last: LastEntry,
}

impl ArchiveFragmentBuilder {
    /// Opens a new builder anchored at the absolute offset of a local-file or
    /// central-directory signature.
    pub fn new(start: u64) -> Self {
        ArchiveFragmentBuilder {
            start,
            end: start,
            files: Vec::new(),
            dirs: Vec::new(),
            eocd: None,
            last: LastEntry::None,
        }
    }

    pub fn push_file(&mut self, sig_offset: u64, rec: DecodedLocalFileHeader) {
        self.end = self.end.max(rec.end);
        self.files.push(RawFileEntry {
            start: sig_offset,
            end: rec.end,
            name: rec.name,
            date: rec.last_mod_date,
            time: rec.last_mod_time,
            corrupt: -1,
        });
        self.last = LastEntry::File;
    }

    pub fn push_dir(&mut self, sig_offset: u64, rec: DecodedCentralDirHeader) {
        self.end = self.end.max(rec.end);
        self.dirs.push(RawDirEntry {
            start: sig_offset,
            end: rec.end,
            name: rec.name,
            date: rec.last_mod_date,
            time: rec.last_mod_time,
            relative_local_header_offset: rec.relative_local_header_offset,
            compressed_size: rec.compressed_size,
            corrupt: -1,
        });
        self.last = LastEntry::Dir;
    }

    pub fn attach_eocd(&mut self, sig_offset: u64, rec: DecodedEocd) {
        self.end = self.end.max(rec.end);
        let dir_start = sig_offset as i64 - rec.dir_size as i64;
        let archive_start = dir_start - rec.dir_offset as i64;
        self.eocd = Some(EocdSummary {
            declared_entries: rec.total_entries,
            dir_start,
            archive_start,
        });
    }

    /// Marks the most recently appended entry (file or directory) corrupt at `offset`,
    /// mirroring the source tool's `mark_corrupt` delegating to its "last" pointer.
    pub fn mark_corrupt(&mut self, offset: u64) {
        match self.last {
            LastEntry::File => {
                if let Some(f) = self.files.last_mut() {
                    f.corrupt = offset as i64;
                }
            }
            LastEntry::Dir => {
                if let Some(d) = self.dirs.last_mut() {
                    d.corrupt = offset as i64;
                }
            }
            LastEntry::None => {}
        }
    }

    /// Numbers of file and directory entries observed so far, for diagnostics.
    pub fn counts(&self) -> (usize, usize) {
        (self.files.len(), self.dirs.len())
    }

    /// Consumes the builder, computing validity and serialising the JSON shape.
    pub fn finish(self) -> ArchiveFragment {
        let valid = match &self.eocd {
            Some(e) => {
                e.declared_entries as usize == self.dirs.len()
                    && self
                        .dirs
                        .iter()
                        .all(|d| self.files.iter().any(|f| f.name.contains(d.name.as_str())))
                    && self
                        .files
                        .iter()
                        .all(|f| self.dirs.iter().any(|d| f.name.contains(d.name.as_str())))
            }
            None => false,
        };

        let (zip_start, dir_start, dir_count) = match &self.eocd {
            Some(e) => (
                Some(e.archive_start),
                Some(e.dir_start),
                Some(e.declared_entries as u32),
            ),
            None => (None, None, None),
        };

        let (files, dirs) = if valid {
            (None, None)
        } else {
            let files_json: Vec<FileEntryJson> = self
                .files
                .iter()
                .map(|f| FileEntryJson {
                    start: f.start,
                    end: f.end,
                    name: f.name.clone(),
                    fid: format!("{}/({}, {})", f.name, f.date, f.time),
                    corrupt: f.corrupt,
                })
                .collect();
            let dirs_json: Vec<DirEntryJson> = self
                .dirs
                .iter()
                .map(|d| {
                    // Self-contained from the directory record's own fields,
                    // matching `detect_zip.py`'s `relative_file_end =
                    // relative_file_start + compressed_len` — independent of
                    // whether a matching file entry was ever observed.
                    let relative_end =
                        d.relative_local_header_offset as i64 + d.compressed_size as i64;
                    DirEntryJson {
                        name: d.name.clone(),
                        reference: format!("{}/({}, {})", d.name, d.date, d.time),
                        offset: [d.relative_local_header_offset as i64, relative_end],
                        corrupt: d.corrupt,
                    }
                })
                .collect();
            (Some(files_json), Some(dirs_json))
        };

        ArchiveFragment {
            start: self.start,
            end: self.end,
            valid,
            zip_start,
            dir_start,
            dir_count,
            files,
            dirs,
        }
    }
}
