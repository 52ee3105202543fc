//! Buffers bytes matching no known signature into [`UnknownFragment`]s.
//!
//! Grounded on `original_source/procreate_repair/detect_zip.py`'s
//! `UnknownFragments` class: a fragment opens on the first non-zero byte,
//! tracks a first-four-byte magic, counts a trailing zero run to split on a
//! gap, and exposes `undo_header`/`rollback`/`eof` for the carver to call as
//! it discovers a signature, abandons a parse, or reaches the end of stream.
//! Owned exclusively by the carver, per the design note in `DESIGN.md`.

use super::fragment::UnknownFragment;

/// Length of an all-zero run that splits an in-progress unknown fragment.
pub const GAP_THRESHOLD: u64 = 512;

#[derive(Debug)]
struct OpenFragment {
    start: u64,
    end: u64,
    magic: Vec<u8>,
    zero_run: u64,
    rollback: bool,
}

/// Accumulates unknown byte runs between decoded archive records.
#[derive(Debug, Default)]
pub struct UnknownCollector {
    open: Option<OpenFragment>,
    next_rollback: bool,
    fragments: Vec<UnknownFragment>,
}

impl UnknownCollector {
    pub fn new() -> Self {
        UnknownCollector::default()
    }

    /// Feeds one byte at absolute offset `offset` that matched no signature.
    pub fn push(&mut self, offset: u64, byte: u8) {
        if self.open.is_none() {
            if byte == 0 {
                return;
            }
            self.open = Some(OpenFragment {
                start: offset,
                end: offset + 1,
                magic: vec![byte],
                zero_run: 0,
                rollback: self.next_rollback,
            });
            self.next_rollback = false;
            return;
        }

        let frag = self.open.as_mut().unwrap();
        if frag.magic.len() < 4 {
            frag.magic.push(byte);
        }
        frag.end = offset + 1;

        if byte == 0 {
            frag.zero_run += 1;
            if frag.zero_run >= GAP_THRESHOLD {
                let mut frag = self.open.take().unwrap();
                frag.end -= frag.zero_run;
                self.flush_fragment(frag);
            }
        } else {
            frag.zero_run = 0;
        }
    }

    fn flush_fragment(&mut self, frag: OpenFragment) {
        if frag.end > frag.start {
            self.fragments.push(UnknownFragment {
                start: frag.start,
                end: frag.end,
                magic: frag.magic,
                rollback: frag.rollback,
            });
        }
    }

    /// Called when the carver discovers the last four bytes it delivered were
    /// in fact a signature: rewinds the open fragment's end by 4, discarding it
    /// if that empties it, otherwise flushing it.
    pub fn undo_header(&mut self) {
        if let Some(mut frag) = self.open.take() {
            frag.end = frag.end.saturating_sub(4).max(frag.start);
            self.flush_fragment(frag);
        }
    }

    /// Called when the carver abandons a misparsed structure: drops the open
    /// fragment without flushing it, and marks the next fragment opened as a
    /// rollback fragment.
    pub fn rollback(&mut self) {
        self.open = None;
        self.next_rollback = true;
    }

    /// Flushes any open fragment at end of stream.
    pub fn eof(&mut self) {
        if let Some(frag) = self.open.take() {
            self.flush_fragment(frag);
        }
    }

    /// Drains the accumulated fragments.
    pub fn take_fragments(&mut self) -> Vec<UnknownFragment> {
        std::mem::take(&mut self.fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_on_first_nonzero_byte() {
        let mut c = UnknownCollector::new();
        c.push(0, 0);
        c.push(1, 0xAB);
        c.push(2, 0xCD);
        c.eof();
        let frags = c.take_fragments();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].start, 1);
        assert_eq!(frags[0].end, 3);
        assert_eq!(frags[0].magic, vec![0xAB, 0xCD]);
    }

    #[test]
    fn splits_on_long_zero_run() {
        let mut c = UnknownCollector::new();
        c.push(0, 0xFF);
        for i in 0..GAP_THRESHOLD {
            c.push(1 + i, 0);
        }
        c.push(1 + GAP_THRESHOLD, 0xEE);
        c.eof();
        let frags = c.take_fragments();
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].end, 1); // trailing zero run trimmed off
        assert_eq!(frags[1].start, 1 + GAP_THRESHOLD);
    }

    #[test]
    fn rollback_drops_open_fragment_and_marks_next() {
        let mut c = UnknownCollector::new();
        c.push(0, 0xAA);
        c.rollback();
        c.push(5, 0xBB);
        c.eof();
        let frags = c.take_fragments();
        assert_eq!(frags.len(), 1);
        assert!(frags[0].rollback);
        assert_eq!(frags[0].start, 5);
    }

    #[test]
    fn undo_header_discards_fragment_emptied_by_rewind() {
        let mut c = UnknownCollector::new();
        c.push(0, 0x50);
        c.push(1, 0x4B);
        c.push(2, 0x03);
        c.push(3, 0x04);
        c.undo_header();
        c.eof();
        assert!(c.take_fragments().is_empty());
    }
}
