//! Storage backend interface consumed by the readers
//!
//! The array storage format itself lives behind these traits. A backend opens
//! datasets by their in-file path; the returned storage handle reports its
//! shape and performs full or hyperslab reads, each producing a fresh buffer.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::options::ReadOptions;
use crate::schema::{ElementType, Shape};
use crate::selection::Hyperslab;

/// A store of named datasets, typically one file
pub trait StorageBackend: Send + Sync {
    /// Open the dataset at `path` for reads described by `options`
    ///
    /// Fails with [`Error::TypeMismatch`] when the stored element type differs
    /// from the requested one.
    fn open_dataset(&self, path: &str, options: &ReadOptions) -> Result<Box<dyn DatasetStorage>>;

    /// Open a one-dimensional dataset of packed compound records
    fn open_compound(&self, path: &str) -> Result<Box<dyn CompoundStorage>> {
        Err(Error::NotImplemented(format!(
            "compound datasets are not supported by this backend ({path})"
        )))
    }
}

/// An open dataset
pub trait DatasetStorage: Send {
    /// Shape of the whole dataset
    fn shape(&self) -> Shape;

    /// Element type of the stored values
    fn element_type(&self) -> ElementType;

    /// Read the whole dataset
    fn read_full(&mut self) -> Result<Buffer>;

    /// Read the rectangular region `slab`, already validated against [`DatasetStorage::shape`]
    fn read_hyperslab(&mut self, slab: &Hyperslab) -> Result<Buffer>;

    /// Release the dataset
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An open dataset of packed compound records
pub trait CompoundStorage: Send {
    /// Number of records
    fn record_count(&self) -> usize;

    /// Member names in source (byte layout) order
    fn member_names(&self) -> Result<Vec<String>>;

    /// All records as packed bytes
    fn read_packed(&mut self) -> Result<Vec<u8>>;
}
