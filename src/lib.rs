//! Forensic salvage of Procreate-style drawing documents out of directories
//! of fixed-size disk-recovery chunks.
//!
//! The core pipeline (see `SPEC_FULL.md`) is: a virtual [`chunk_stream`]
//! over the chunk directory feeds a [`carve`]r that reconstructs archive
//! structure without a central directory, and an [`inflate`]/[`tile`]
//! pipeline that turns recovered or wrapper-less tile ranges into raster
//! images once a [`document`] property-list (when present) supplies
//! orientation and size.

pub mod carve;
pub mod chunk_stream;
pub mod document;
pub mod error;
pub mod inflate;
pub mod pipeline;
pub mod tile;

pub use chunk_stream::ChunkStream;
pub use error::{Result, SalvageError};
