//! Crate-wide error type.
//!
//! Every fallible operation that crosses a module boundary returns
//! [`SalvageError`]. Bounded, per-item failures (a single tile, a single
//! archive fragment) are captured as `Option<SalvageError>` fields on the
//! fragment/tile record instead of aborting the run — see the carve and
//! tile modules.

use thiserror::Error;

/// All error kinds the salvage pipeline can produce.
#[derive(Debug, Error)]
pub enum SalvageError {
    /// A seek or read fell outside `[0, size]` of a [`crate::chunk_stream::ChunkStream`]
    /// while operating in strict mode.
    #[error("stream bounds violated at offset {offset}")]
    StreamBounds {
        /// Absolute offset at which the violation was detected.
        offset: u64,
    },

    /// A local file entry's payload failed to inflate as raw DEFLATE.
    #[error("inflate failed for entry at offset {offset}: {source}")]
    Inflate {
        /// Absolute offset of the local file entry's signature.
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A tile payload failed to decompress to its expected size.
    #[error("tile decode failed at offset {offset}: {reason}")]
    TileDecode {
        /// Absolute offset of the tile's local file entry.
        offset: u64,
        /// Human-readable reason (LZO library error text, or a size mismatch).
        reason: String,
    },

    /// All four geometry-inference fallback groups failed to yield a tile edge length.
    #[error("no tile in the supplied set decompressed cleanly; geometry unknown")]
    GeometryUnknown,

    /// [`crate::document::DocumentReader::validate`] found a UUID with no matching archive entry.
    #[error("missing resource: {uuid} has no matching archive entry")]
    MissingResource {
        /// The UUID string that could not be matched.
        uuid: String,
    },

    /// The carver's state machine observed a transition it did not expect.
    #[error("corrupt archive fragment at offset {offset}: {reason}")]
    CorruptArchiveFragment {
        /// Absolute offset at which the mismatch was detected.
        offset: u64,
        /// Description of the unexpected transition.
        reason: String,
    },

    /// Transparent wrapper for I/O errors at the boundary with `std::io`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SalvageError>;
