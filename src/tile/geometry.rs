//! Infers a layer grid's tile edge length and edge/base remainder sizes from
//! a set of tile byte ranges with no surrounding archive metadata.
//!
//! Grounded on `original_source/procreate_repair/partial_layer_writer.py`'s
//! `get_tile_size` / `get_edge_size` / `write_partial_layer`, ported 1:1 in
//! control flow: probe mid tiles for `T`, fall back through side, base and
//! corner groups, then probe side/base tiles for `W`/`H` given `T`.

use log::warn;

use crate::chunk_stream::ChunkStream;
use crate::error::SalvageError;
use crate::inflate::Inflater;

use super::codec::{TileCodec, TILE_PROBE_UPPER_BOUND};
use super::ChunkRange;

/// Default tile edge length used when no tile in the set decompresses cleanly.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// The inferred geometry of one layer's tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerGrid {
    pub columns: u32,
    pub rows: u32,
    pub tile_size: u32,
    pub edge_width: u32,
    pub base_height: u32,
}

impl LayerGrid {
    pub fn canvas_size(&self) -> (u32, u32) {
        (
            (self.columns - 1) * self.tile_size + self.edge_width,
            (self.rows - 1) * self.tile_size + self.base_height,
        )
    }

    /// Builds a grid from an exactly-known canvas size and tile size, as used
    /// when rendering a layer whose document property-list is intact — no
    /// trial decompression needed.
    pub fn from_known_size(tile_size: u32, width: u32, height: u32) -> LayerGrid {
        let columns = width.div_ceil(tile_size).max(1);
        let rows = height.div_ceil(tile_size).max(1);
        let edge_width = width - (columns - 1) * tile_size;
        let base_height = height - (rows - 1) * tile_size;
        LayerGrid {
            columns,
            rows,
            tile_size,
            edge_width,
            base_height,
        }
    }
}

fn probe_pixels(
    stream: &mut ChunkStream,
    inflater: &Inflater,
    range: &ChunkRange,
) -> Option<usize> {
    let compressed = inflater.inflate(stream, range.start, range.end).ok()?;
    if compressed.is_empty() {
        return None;
    }
    let decoded = TileCodec::decode(&compressed, TILE_PROBE_UPPER_BOUND, range.start).ok()?;
    if decoded.is_empty() {
        return None;
    }
    Some(decoded.len() / 4)
}

/// Partitions `ranges` into mid/side/base/corner groups and probes them to
/// determine tile geometry.
pub struct TileGeometrySolver;

impl TileGeometrySolver {
    pub fn solve(stream: &mut ChunkStream, ranges: &[ChunkRange]) -> Result<LayerGrid, SalvageError> {
        if ranges.is_empty() {
            return Err(SalvageError::GeometryUnknown);
        }

        let columns = ranges.iter().map(|r| r.column).max().unwrap() + 1;
        let rows = ranges.iter().map(|r| r.row).max().unwrap() + 1;
        let last_col = columns - 1;
        let last_row = rows - 1;

        let mid: Vec<&ChunkRange> = ranges
            .iter()
            .filter(|r| r.column != last_col && r.row != last_row)
            .collect();
        let side: Vec<&ChunkRange> = ranges
            .iter()
            .filter(|r| r.column == last_col && r.row != last_row)
            .collect();
        let base: Vec<&ChunkRange> = ranges
            .iter()
            .filter(|r| r.column != last_col && r.row == last_row)
            .collect();
        let corner: Vec<&ChunkRange> = ranges
            .iter()
            .filter(|r| r.column == last_col && r.row == last_row)
            .collect();

        let inflater = Inflater::lenient();

        let tile_size = Self::probe_square(stream, &inflater, &mid)
            .or_else(|| Self::probe_square(stream, &inflater, &side))
            .or_else(|| Self::probe_square(stream, &inflater, &base))
            .or_else(|| Self::probe_square(stream, &inflater, &corner))
            .unwrap_or_else(|| {
                warn!("no tile decompressed cleanly; defaulting tile size to {DEFAULT_TILE_SIZE}");
                DEFAULT_TILE_SIZE
            });

        let mut edge_width = Self::probe_edge(stream, &inflater, &side, tile_size);
        let mut base_height = Self::probe_edge(stream, &inflater, &base, tile_size);

        if edge_width.is_none() {
            if let Some(h) = base_height {
                edge_width = Self::probe_edge_with_known(stream, &inflater, &corner, h);
            }
        }
        if base_height.is_none() {
            if let Some(w) = edge_width {
                base_height = Self::probe_edge_with_known(stream, &inflater, &corner, w);
            }
        }

        let edge_width = edge_width.unwrap_or(tile_size);
        let base_height = base_height.unwrap_or(tile_size);

        Ok(LayerGrid {
            columns,
            rows,
            tile_size,
            edge_width,
            base_height,
        })
    }

    fn probe_square(stream: &mut ChunkStream, inflater: &Inflater, group: &[&ChunkRange]) -> Option<u32> {
        for range in group {
            if let Some(pixel_count) = probe_pixels(stream, inflater, range) {
                let t = (pixel_count as f64).sqrt() as u32;
                if t > 0 {
                    return Some(t);
                }
            }
        }
        None
    }

    fn probe_edge(
        stream: &mut ChunkStream,
        inflater: &Inflater,
        group: &[&ChunkRange],
        tile_size: u32,
    ) -> Option<u32> {
        for range in group {
            if let Some(pixel_count) = probe_pixels(stream, inflater, range) {
                let edge = pixel_count as u32 / tile_size;
                if edge > 0 {
                    return Some(edge);
                }
            }
        }
        None
    }

    fn probe_edge_with_known(
        stream: &mut ChunkStream,
        inflater: &Inflater,
        group: &[&ChunkRange],
        known_edge: u32,
    ) -> Option<u32> {
        for range in group {
            if let Some(pixel_count) = probe_pixels(stream, inflater, range) {
                if known_edge == 0 {
                    continue;
                }
                let other = pixel_count as u32 / known_edge;
                if other > 0 {
                    return Some(other);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    use super::*;

    const LOCAL_FILE_SIG: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
    const LAYER: &str = "3F2504E0-4F89-11D3-9A0C-0305E82C3301";

    fn local_file_entry(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&LOCAL_FILE_SIG);
        out.extend_from_slice(&[0u8; 6]);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Writes one chunk file holding a local-file entry per `(name, pixels)`
    /// pair, LZO-then-deflate-compressing non-empty pixel buffers (an empty
    /// buffer stands in for a tile that fails to decode cleanly). Returns
    /// the corresponding `ChunkRange`s.
    fn build_tiles(dir: &Path, entries: &[(String, Vec<u8>)]) -> Vec<ChunkRange> {
        let mut data = Vec::new();
        let mut ranges = Vec::new();
        for (name, pixels) in entries {
            let payload = if pixels.is_empty() {
                Vec::new()
            } else {
                let lzo = minilzo::compress(pixels).unwrap();
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&lzo).unwrap();
                encoder.finish().unwrap()
            };
            let start = data.len() as u64;
            data.extend_from_slice(&local_file_entry(name, &payload));
            let end = data.len() as u64;
            ranges.push(ChunkRange::parse(name, start, end).unwrap());
        }
        std::fs::File::create(dir.join("FILE0001.CHK"))
            .unwrap()
            .write_all(&data)
            .unwrap();
        ranges
    }

    fn square_pixels(edge: u32) -> Vec<u8> {
        vec![0u8; (edge * edge * 4) as usize]
    }

    fn name(col: u32, row: u32) -> String {
        format!("{LAYER}/{col}~{row}.chunk")
    }

    #[test]
    fn mid_tile_determines_tile_size() {
        let dir = TempDir::new().unwrap();
        let ranges = build_tiles(
            dir.path(),
            &[
                (name(0, 0), square_pixels(4)), // mid, decodes cleanly
                (name(1, 1), Vec::new()),       // corner, establishes a 2x2 grid
            ],
        );
        let mut stream = ChunkStream::open(dir.path()).unwrap();
        let grid = TileGeometrySolver::solve(&mut stream, &ranges).unwrap();
        assert_eq!(grid.tile_size, 4);
        assert_eq!((grid.columns, grid.rows), (2, 2));
    }

    #[test]
    fn falls_back_to_side_when_mid_fails() {
        let dir = TempDir::new().unwrap();
        let ranges = build_tiles(
            dir.path(),
            &[
                (name(0, 0), Vec::new()),      // mid, corrupted
                (name(1, 0), square_pixels(6)), // side, decodes cleanly
                (name(1, 1), Vec::new()),      // corner, establishes a 2x2 grid
            ],
        );
        let mut stream = ChunkStream::open(dir.path()).unwrap();
        let grid = TileGeometrySolver::solve(&mut stream, &ranges).unwrap();
        assert_eq!(grid.tile_size, 6);
    }

    #[test]
    fn falls_back_to_base_when_mid_and_side_fail() {
        let dir = TempDir::new().unwrap();
        let ranges = build_tiles(
            dir.path(),
            &[
                (name(0, 0), Vec::new()),      // mid, corrupted
                (name(1, 0), Vec::new()),      // side, corrupted
                (name(0, 1), square_pixels(5)), // base, decodes cleanly
                (name(1, 1), Vec::new()),      // corner, establishes a 2x2 grid
            ],
        );
        let mut stream = ChunkStream::open(dir.path()).unwrap();
        let grid = TileGeometrySolver::solve(&mut stream, &ranges).unwrap();
        assert_eq!(grid.tile_size, 5);
    }

    #[test]
    fn falls_back_to_corner_when_everything_else_fails() {
        let dir = TempDir::new().unwrap();
        let ranges = build_tiles(
            dir.path(),
            &[
                (name(0, 0), Vec::new()),      // mid, corrupted
                (name(1, 0), Vec::new()),      // side, corrupted
                (name(0, 1), Vec::new()),      // base, corrupted
                (name(1, 1), square_pixels(3)), // corner, decodes cleanly
            ],
        );
        let mut stream = ChunkStream::open(dir.path()).unwrap();
        let grid = TileGeometrySolver::solve(&mut stream, &ranges).unwrap();
        assert_eq!(grid.tile_size, 3);
    }

    #[test]
    fn defaults_to_256_when_nothing_decodes() {
        let dir = TempDir::new().unwrap();
        let ranges = build_tiles(
            dir.path(),
            &[
                (name(0, 0), Vec::new()),
                (name(1, 0), Vec::new()),
                (name(0, 1), Vec::new()),
                (name(1, 1), Vec::new()),
            ],
        );
        let mut stream = ChunkStream::open(dir.path()).unwrap();
        let grid = TileGeometrySolver::solve(&mut stream, &ranges).unwrap();
        assert_eq!(grid.tile_size, DEFAULT_TILE_SIZE);
    }

    #[test]
    fn empty_range_set_is_geometry_unknown() {
        let dir = TempDir::new().unwrap();
        std::fs::File::create(dir.path().join("FILE0001.CHK"))
            .unwrap()
            .write_all(&[])
            .unwrap();
        let mut stream = ChunkStream::open(dir.path()).unwrap();
        let result = TileGeometrySolver::solve(&mut stream, &[]);
        assert!(matches!(result, Err(SalvageError::GeometryUnknown)));
    }
}
