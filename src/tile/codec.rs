//! Decompresses one inflated tile payload with the LZO variant used for
//! pixel tiles.
//!
//! Grounded on `original_source/procreate_repair/layer_writer.py` /
//! `partial_layer_writer.py`'s `lzo.decompress(data, False, finalsize)` calls:
//! the caller supplies the exact expected output size. `minilzo` (adopted
//! from `other_examples/..._flyingcircusio-backy-extract`, the pack's closest
//! caller-sized LZO consumer) matches that contract.

use crate::error::SalvageError;

/// Upper bound used when the real expected size isn't known yet (geometry
/// inference probing) — `512 * 512 * 4` bytes, per `SPEC_FULL.md` §6.
pub const TILE_PROBE_UPPER_BOUND: usize = 512 * 512 * 4;

/// Decompresses `payload` into exactly `expected_len` bytes.
pub struct TileCodec;

impl TileCodec {
    /// Decompresses one tile's payload. `offset` is carried only for error
    /// reporting (the absolute offset of the tile's local file entry).
    pub fn decode(
        payload: &[u8],
        expected_len: usize,
        offset: u64,
    ) -> Result<Vec<u8>, SalvageError> {
        minilzo::decompress(payload, expected_len).map_err(|err| SalvageError::TileDecode {
            offset,
            reason: format!("{err:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_to_the_exact_expected_length() {
        let pixels = vec![0x42u8; 64];
        let compressed = minilzo::compress(&pixels).unwrap();
        let decoded = TileCodec::decode(&compressed, pixels.len(), 0).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn empty_payload_fails_to_decode() {
        let result = TileCodec::decode(&[], 64, 0);
        assert!(matches!(result, Err(SalvageError::TileDecode { .. })));
    }
}
