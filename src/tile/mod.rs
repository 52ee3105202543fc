//! Tile decoding and layer rendering: from raw compressed pixel-tile byte
//! ranges to an assembled RGBA canvas.

pub mod assembler;
pub mod codec;
pub mod geometry;

pub use assembler::LayerAssembler;
pub use codec::TileCodec;
pub use geometry::{LayerGrid, TileGeometrySolver};

/// One tile's location in the stream and in the grid, parsed from a name of
/// the form `"<layer-uuid>/<column>~<row>.chunk"`.
#[derive(Debug, Clone)]
pub struct ChunkRange {
    pub layer_id: String,
    pub column: u32,
    pub row: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// Parses a chunk range descriptor; returns `None` if `name` doesn't match
    /// the expected `"<uuid>/<column>~<row>.chunk"` shape.
    pub fn parse(name: &str, start: u64, end: u64) -> Option<Self> {
        let (layer_id, rest) = name.split_once('/')?;
        let rest = rest.strip_suffix(".chunk")?;
        let (column, row) = rest.split_once('~')?;
        Some(ChunkRange {
            layer_id: layer_id.to_string(),
            column: column.parse().ok()?,
            row: row.parse().ok()?,
            start,
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_chunk_name() {
        let range = ChunkRange::parse("3F2504E0-4F89-11D3-9A0C-0305E82C3301/4~2.chunk", 10, 20).unwrap();
        assert_eq!(range.layer_id, "3F2504E0-4F89-11D3-9A0C-0305E82C3301");
        assert_eq!(range.column, 4);
        assert_eq!(range.row, 2);
    }

    #[test]
    fn rejects_malformed_name() {
        assert!(ChunkRange::parse("not-a-chunk-name", 0, 0).is_none());
    }
}
