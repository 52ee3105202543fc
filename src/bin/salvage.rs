//! CLI front-end for `chkdir_salvage`.
//!
//! Owns every "external collaborator" concern named in `SPEC_FULL.md` §1/§10.3:
//! manifest I/O, output directory creation, and PNG encoding. The library
//! crate never touches a manifest file or an image encoder directly.
//!
//! Grounded on `forensicxlab-exhume_body/src/main.rs`'s `clap::Command`
//! builder, generalized into subcommands per `LambdaEd1th-dzip-cli`'s
//! `clap::Parser`/`Subcommand` derive style (also present in this retrieval
//! pack's `AndreyAkinshin-zesven`).

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde::Deserialize;

use chkdir_salvage::carve::{repack_fragment, ArchiveFragment, FileEntryRange};
use chkdir_salvage::chunk_stream::ChunkStream;
use chkdir_salvage::pipeline;
use chkdir_salvage::tile::ChunkRange;
use chkdir_salvage::SalvageError;

#[derive(Parser)]
#[command(name = "salvage", author, version, about = "Salvage Procreate drawing documents from directories of disk-recovery chunks.")]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep a chunk directory and write partials.zips.json / partials.unknown.json.
    Carve {
        /// Directory of lexicographically-ordered .CHK files.
        chunk_dir: PathBuf,
        /// Directory the two JSON reports are written into.
        out_dir: PathBuf,
    },
    /// Recover every valid ArchiveFragment from a carver report as a standalone document.
    RecoverEmbedded {
        /// `partials.zips.json` (or any JSON array of ArchiveFragment).
        fragments_json: PathBuf,
        chunk_dir: PathBuf,
        out_dir: PathBuf,
        /// Write only the composite preview PNG, skipping the full archive.
        #[arg(long)]
        preview: bool,
    },
    /// Render one tile-range set whose archive wrapper is lost.
    RenderLayer {
        /// JSON file containing `[{name, start, end}]`.
        tile_ranges_json: PathBuf,
        chunk_dir: PathBuf,
        out_png: PathBuf,
    },
    /// Batch form of render-layer, driven by a manifest of tile-range file paths.
    RenderManifest {
        /// JSON array of paths to tile-range files (see render-layer).
        manifest_json: PathBuf,
        chunk_dir: PathBuf,
    },
    /// Re-pack a fragment's recovered file entries into a fresh, readable ZIP archive.
    Repack {
        /// JSON file containing `[{name, start, end}]`.
        fragment_json: PathBuf,
        chunk_dir: PathBuf,
        out_zip: PathBuf,
        /// Propagate the first inflate failure instead of skipping the entry.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Deserialize)]
struct NamedRange {
    name: String,
    start: u64,
    end: u64,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> std::io::Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|err| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())
    })
}

fn to_json_bytes<T: serde::Serialize>(value: &T) -> std::io::Result<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))
}

/// Writes `bytes` to a temp path in the same directory and renames it into
/// place, so a crash mid-write never leaves a partial file at `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn cmd_carve(chunk_dir: &Path, out_dir: &Path) -> Result<(), SalvageError> {
    fs::create_dir_all(out_dir)?;
    let (fragments, unknown) = pipeline::carve_chunk_dir(chunk_dir)?;
    info!(
        "carved {} archive fragment(s), {} unknown run(s)",
        fragments.len(),
        unknown.len()
    );
    write_atomic(
        &out_dir.join("partials.zips.json"),
        to_json_bytes(&fragments)?.as_slice(),
    )?;
    write_atomic(
        &out_dir.join("partials.unknown.json"),
        to_json_bytes(&unknown)?.as_slice(),
    )?;
    Ok(())
}

fn cmd_recover_embedded(
    fragments_json: &Path,
    chunk_dir: &Path,
    out_dir: &Path,
    preview: bool,
) -> Result<(), SalvageError> {
    fs::create_dir_all(out_dir)?;
    let fragments: Vec<ArchiveFragment> = read_json(fragments_json)?;
    let results = pipeline::recover_all_embedded(chunk_dir, &fragments, preview);

    for (start, result) in results {
        match result {
            Ok(recovered) => {
                if !recovered.missing_uuids.is_empty() {
                    warn!(
                        "document at offset {start} is missing {} referenced UUID(s): {:?}",
                        recovered.missing_uuids.len(),
                        recovered.missing_uuids
                    );
                }
                let stem = if recovered.document_name.is_empty() {
                    start.to_string()
                } else {
                    recovered.document_name.clone()
                };
                if let Some(bytes) = &recovered.archive_bytes {
                    write_atomic(&out_dir.join(format!("{stem}.procreate")), bytes)?;
                }
                let preview_path = out_dir.join(format!("{stem}.preview.png"));
                recovered
                    .preview
                    .save(&preview_path)
                    .map_err(|err| SalvageError::CorruptArchiveFragment {
                        offset: start,
                        reason: format!("failed writing preview PNG: {err}"),
                    })?;
                info!("recovered archive at offset {start} -> {}", preview_path.display());
            }
            Err(err) => error!("failed to recover archive at offset {start}: {err}"),
        }
    }
    Ok(())
}

fn load_chunk_ranges(path: &Path) -> std::io::Result<Vec<ChunkRange>> {
    let named: Vec<NamedRange> = read_json(path)?;
    Ok(named
        .into_iter()
        .filter_map(|r| ChunkRange::parse(&r.name, r.start, r.end))
        .collect())
}

fn cmd_render_layer(tile_ranges_json: &Path, chunk_dir: &Path, out_png: &Path) -> Result<(), SalvageError> {
    let ranges = load_chunk_ranges(tile_ranges_json)?;
    let mut stream = ChunkStream::open(chunk_dir)?;
    let image = pipeline::render_partial_layer(&mut stream, &ranges)?;
    if let Some(parent) = out_png.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(out_png)
        .map_err(|err| SalvageError::CorruptArchiveFragment {
            offset: 0,
            reason: format!("failed writing {}: {err}", out_png.display()),
        })?;
    info!("rendered {} -> {}", tile_ranges_json.display(), out_png.display());
    Ok(())
}

/// Maps a tile-range JSON path to its PNG output path per `SPEC_FULL.md` §6:
/// replace `/json/` with `/png/` and a trailing `.json` with `.png`.
fn manifest_output_path(input: &str) -> PathBuf {
    PathBuf::from(input.replacen("/json/", "/png/", 1).replacen(".json", ".png", 1))
}

fn cmd_render_manifest(manifest_json: &Path, chunk_dir: &Path) -> Result<(), SalvageError> {
    let entries: Vec<String> = read_json(manifest_json)?;
    let mut jobs = Vec::with_capacity(entries.len());
    for entry in &entries {
        let ranges = load_chunk_ranges(Path::new(entry))?;
        jobs.push((entry.clone(), ranges));
    }

    let results = pipeline::render_manifest_layers(chunk_dir, jobs);
    for (label, result) in results {
        let out_path = manifest_output_path(&label);
        match result {
            Ok(image) => {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                if let Err(err) = image.save(&out_path) {
                    error!("failed writing {}: {err}", out_path.display());
                    continue;
                }
                info!("rendered {label} -> {}", out_path.display());
            }
            Err(err) => error!("failed to render {label}: {err}"),
        }
    }
    Ok(())
}

fn cmd_repack(fragment_json: &Path, chunk_dir: &Path, out_zip: &Path, strict: bool) -> Result<(), SalvageError> {
    let named: Vec<NamedRange> = read_json(fragment_json)?;
    let entries: Vec<FileEntryRange> = named
        .into_iter()
        .map(|r| FileEntryRange {
            name: r.name,
            start: r.start,
            end: r.end,
        })
        .collect();

    let mut stream = ChunkStream::open(chunk_dir)?;
    let bytes = repack_fragment(&mut stream, &entries, strict)?;
    if let Some(parent) = out_zip.parent() {
        fs::create_dir_all(parent)?;
    }
    write_atomic(out_zip, &bytes)?;
    info!("repacked {} entries -> {}", entries.len(), out_zip.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = match &cli.command {
        Commands::Carve { chunk_dir, out_dir } => cmd_carve(chunk_dir, out_dir),
        Commands::RecoverEmbedded {
            fragments_json,
            chunk_dir,
            out_dir,
            preview,
        } => cmd_recover_embedded(fragments_json, chunk_dir, out_dir, *preview),
        Commands::RenderLayer {
            tile_ranges_json,
            chunk_dir,
            out_png,
        } => cmd_render_layer(tile_ranges_json, chunk_dir, out_png),
        Commands::RenderManifest {
            manifest_json,
            chunk_dir,
        } => cmd_render_manifest(manifest_json, chunk_dir),
        Commands::Repack {
            fragment_json,
            chunk_dir,
            out_zip,
            strict,
        } => cmd_repack(fragment_json, chunk_dir, out_zip, *strict),
    };

    if let Err(err) = result {
        let offset = match &err {
            SalvageError::StreamBounds { offset } => Some(*offset),
            SalvageError::Inflate { offset, .. } => Some(*offset),
            SalvageError::TileDecode { offset, .. } => Some(*offset),
            SalvageError::CorruptArchiveFragment { offset, .. } => Some(*offset),
            _ => None,
        };
        match offset {
            Some(offset) => error!("salvage failed at offset {offset}: {err}"),
            None => error!("salvage failed: {err}"),
        }
        std::process::exit(1);
    }
}
