//! Inflates a single local-file-entry payload.
//!
//! Grounded on `original_source/procreate_repair/deflate.py`'s `deflate_range`
//! (`zlib.decompressobj(-zlib.MAX_WBITS)`, i.e. raw DEFLATE with no zlib
//! header or Adler-32 trailer) and `forensicxlab-exhume_body/src/ewf.rs`'s use
//! of `flate2` for section payloads.

use std::io::Read;

use flate2::bufread::DeflateDecoder;

use crate::chunk_stream::ChunkStream;
use crate::error::SalvageError;

/// Inflates the payload of one local file entry known to span `[start, end)`
/// in the stream, with an orthogonal strict/lenient failure posture.
pub struct Inflater {
    lenient: bool,
}

impl Inflater {
    pub fn strict() -> Self {
        Inflater { lenient: false }
    }

    pub fn lenient() -> Self {
        Inflater { lenient: true }
    }

    /// Inflates the entry at `[start, end)`. In lenient mode a malformed
    /// stream yields an empty result instead of propagating the error.
    pub fn inflate(
        &self,
        stream: &mut ChunkStream,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, SalvageError> {
        match inflate_range(stream, start, end) {
            Ok(bytes) => Ok(bytes),
            Err(err) if self.lenient => {
                log::warn!("lenient inflate at {start} discarded: {err}");
                Ok(Vec::new())
            }
            Err(err) => Err(SalvageError::Inflate {
                offset: start,
                source: err,
            }),
        }
    }
}

fn inflate_range(stream: &mut ChunkStream, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    stream.seek_mode((start + 26) as i64, 0)?;
    let mut lens = [0u8; 4];
    stream.read_exact(&mut lens)?;
    let name_len = u16::from_le_bytes([lens[0], lens[1]]) as i64;
    let extra_len = u16::from_le_bytes([lens[2], lens[3]]) as i64;
    stream.seek_mode(name_len + extra_len, 1)?;

    let payload_len = end.saturating_sub(stream.offset()) as usize;
    let mut compressed = vec![0u8; payload_len];
    stream.read_exact(&mut compressed)?;

    let mut decoder = DeflateDecoder::new(&compressed[..]);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
