//! Error types for windowed dataset access

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::selection::Axis;

/// Result type for dataset access operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dataset access operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file or pipe operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Missing or invalid process configuration (checked before any worker is spawned)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The named pipe for a transfer could not be created
    #[error("Failed to create pipe {path:?}: {source}")]
    PipeCreation {
        /// Path of the pipe that could not be created
        path: PathBuf,
        /// Underlying OS error
        source: io::Error,
    },

    /// Storage backend failure, reported verbatim
    #[error("Backend read error: {0}")]
    Backend(String),

    /// Empty, inverted or out-of-extent index range
    #[error("Invalid {axis} range [{start}, {end}] for extent {extent}")]
    InvalidRange {
        /// Axis the range applies to
        axis: Axis,
        /// First index of the range
        start: usize,
        /// Last index of the range (inclusive)
        end: usize,
        /// Extent of the axis
        extent: usize,
    },

    /// Incremental read requested along the wrong axis
    #[error("Cannot perform a {requested} read on a dataset configured for incremental {configured} reads")]
    AxisMismatch {
        /// Axis the handle was configured for
        configured: Axis,
        /// Axis of the rejected request
        requested: Axis,
    },

    /// Source and destination record schemas disagree
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Raw buffer is shorter than the records it should contain
    #[error("Buffer too short: needed {needed} bytes, got {actual}")]
    BufferTooShort {
        /// Bytes required
        needed: usize,
        /// Bytes available
        actual: usize,
    },

    /// Malformed or truncated transfer stream
    #[error("Decode stream error: {0}")]
    DecodeStream(String),

    /// Worker process exited unsuccessfully
    #[error("Worker failed with {status}: {detail}")]
    WorkerFailed {
        /// Exit status of the worker
        status: ExitStatus,
        /// What the caller observed on the pipe
        detail: String,
    },

    /// Transfer was cancelled by the caller
    #[error("Transfer cancelled")]
    Cancelled,

    /// Data type mismatch
    #[error("Data type mismatch: {0}")]
    TypeMismatch(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Feature not implemented
    #[error("Feature not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Build an [`Error::InvalidRange`] for a single index
    pub fn index_out_of_range(axis: Axis, index: usize, extent: usize) -> Self {
        Error::InvalidRange {
            axis,
            start: index,
            end: index,
            extent,
        }
    }
}
