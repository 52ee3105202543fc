//! The byte-by-byte archive carver: a 4-state signature scanner over a
//! [`ChunkStream`] that reconstructs archive structure without a central
//! directory to anchor it.
//!
//! Grounded on `original_source/procreate_repair/detect_zip.py`'s
//! `detect_zip()`, restructured into an explicit state-transition table per
//! the design note in `SPEC_FULL.md` §9.

use std::collections::VecDeque;
use std::io::{self, Read};

use log::{debug, info, warn};

use crate::chunk_stream::ChunkStream;

use super::entry_decoder::{decode_central_dir_header, decode_eocd, decode_local_file_header};
use super::fragment::{ArchiveFragment, ArchiveFragmentBuilder, UnknownFragment};
use super::unknown_collector::UnknownCollector;

const LOCAL_FILE_SIG: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
const EOCD_SIG: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CarverState {
    Unknown,
    File,
    Dir,
    Eof,
}

/// Sweeps a [`ChunkStream`] end to end, producing the two carver reports.
pub struct Carver {
    stream: ChunkStream,
}

impl Carver {
    pub fn new(stream: ChunkStream) -> Self {
        Carver { stream }
    }

    fn close_current(
        current: &mut Option<ArchiveFragmentBuilder>,
        fragments: &mut Vec<ArchiveFragment>,
        corrupt_at: u64,
    ) {
        if let Some(mut builder) = current.take() {
            builder.mark_corrupt(corrupt_at);
            fragments.push(builder.finish());
        }
    }

    /// Runs the carver over the whole stream, returning `(zip fragments, unknown fragments)`.
    pub fn carve(mut self) -> io::Result<(Vec<ArchiveFragment>, Vec<UnknownFragment>)> {
        let size = self.stream.size();
        self.stream.seek_mode(0, 0)?;

        let mut state = CarverState::Unknown;
        let mut window: VecDeque<u8> = VecDeque::with_capacity(4);
        let mut unknown = UnknownCollector::new();
        let mut fragments: Vec<ArchiveFragment> = Vec::new();
        let mut current: Option<ArchiveFragmentBuilder> = None;
        let mut resume_point: u64 = 0;
        // Absolute offset of the signature that opened the entry currently
        // being consumed; on misparse the carver rewinds here (not past the
        // entry's declared end) so a real signature hiding inside a
        // corrupted length field is re-scanned rather than skipped.
        let mut entry_start: u64 = 0;

        loop {
            let mut byte = [0u8; 1];
            if self.stream.read(&mut byte)? == 0 {
                break;
            }
            let pos = self.stream.offset() - 1;
            window.push_back(byte[0]);
            if window.len() > 4 {
                window.pop_front();
            }
            if window.len() < 4 {
                continue;
            }
            let sig_offset = pos + 1 - 4;
            let w: [u8; 4] = [window[0], window[1], window[2], window[3]];

            if w == LOCAL_FILE_SIG {
                unknown.undo_header();
                if state != CarverState::File {
                    Self::close_current(&mut current, &mut fragments, sig_offset);
                    current = Some(ArchiveFragmentBuilder::new(sig_offset));
                }
                state = CarverState::File;
                let rec = decode_local_file_header(&mut self.stream, sig_offset)?;
                debug!("local file entry {:?} at {}", rec.name, sig_offset);
                resume_point = rec.end;
                entry_start = sig_offset;
                current.as_mut().unwrap().push_file(sig_offset, rec);
                self.stream.seek_mode(resume_point as i64, 0)?;
                window.clear();
                continue;
            }

            if w == CENTRAL_DIR_SIG {
                unknown.undo_header();
                if state != CarverState::File && state != CarverState::Dir {
                    warn!(
                        "unexpected transition into directory state from {:?} at {}",
                        state, sig_offset
                    );
                }
                if current.is_none() {
                    current = Some(ArchiveFragmentBuilder::new(sig_offset));
                }
                state = CarverState::Dir;
                let rec = decode_central_dir_header(&mut self.stream, sig_offset)?;
                debug!("central directory entry {:?} at {}", rec.name, sig_offset);
                resume_point = rec.end;
                entry_start = sig_offset;
                current.as_mut().unwrap().push_dir(sig_offset, rec);
                self.stream.seek_mode(resume_point as i64, 0)?;
                window.clear();
                continue;
            }

            if w == EOCD_SIG {
                unknown.undo_header();
                if state != CarverState::Dir {
                    warn!(
                        "unexpected transition into end-of-central-directory state from {:?} at {}",
                        state, sig_offset
                    );
                }
                let rec = decode_eocd(&mut self.stream, sig_offset)?;
                match current.take() {
                    Some(mut builder) => {
                        builder.attach_eocd(sig_offset, rec);
                        let finished = builder.finish();
                        info!(
                            "archive fragment at {} closed, valid = {}",
                            finished.start, finished.valid
                        );
                        fragments.push(finished);
                    }
                    None => warn!("end-of-central-directory at {} with no open archive", sig_offset),
                }
                state = CarverState::Eof;
                resume_point = self.stream.offset();
                window.clear();
                continue;
            }

            // No signature matched this window.
            let falling_offset = sig_offset;
            let falling_byte = window[0];
            match state {
                CarverState::File | CarverState::Dir => {
                    Self::close_current(&mut current, &mut fragments, pos + 1);
                    let rewind_to = entry_start + 1;
                    self.stream.seek_mode(rewind_to as i64, 0)?;
                    unknown.rollback();
                    state = CarverState::Unknown;
                    window.clear();
                }
                CarverState::Unknown | CarverState::Eof => {
                    unknown.push(falling_offset, falling_byte);
                }
            }
        }

        unknown.eof();
        Self::close_current(&mut current, &mut fragments, size);

        Ok((fragments, unknown.take_fragments()))
    }
}
