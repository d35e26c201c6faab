//! The reader contract and its in-process implementation

use dsetio_core::backend::{DatasetStorage, StorageBackend};
use dsetio_core::buffer::{Buffer, DatasetData};
use dsetio_core::error::{Error, Result};
use dsetio_core::options::ReadOptions;
use dsetio_core::schema::Shape;
use dsetio_core::selection::Hyperslab;
use tracing::debug;

/// Operations shared by the direct and the out-of-process readers
///
/// Every read produces a fresh [`DatasetData`]; nothing is cached here.
/// Windowing is layered on top by [`DatasetHandle`](crate::DatasetHandle).
pub trait DatasetReader: Send {
    /// Shape of the whole dataset, stable for the reader's lifetime
    fn shape(&self) -> &Shape;

    /// Options the reader was opened with
    fn options(&self) -> &ReadOptions;

    /// Read the whole dataset
    fn read(&mut self) -> Result<DatasetData>;

    /// Read the region `slab`
    ///
    /// Fails with [`Error::InvalidRange`] before touching storage when either
    /// range is inverted or reaches past [`DatasetReader::shape`].
    fn read_subset(&mut self, slab: &Hyperslab) -> Result<DatasetData>;

    /// Read the whole dataset into `dest`, returning the loaded shape
    fn read_into(&mut self, dest: &mut Buffer) -> Result<Shape> {
        let data = self.read()?;
        dest.fill_from(data.buffer)?;
        Ok(data.dims)
    }

    /// Read `slab` into `dest`, returning the loaded shape
    fn read_subset_into(&mut self, slab: &Hyperslab, dest: &mut Buffer) -> Result<Shape> {
        let data = self.read_subset(slab)?;
        dest.fill_from(data.buffer)?;
        Ok(data.dims)
    }

    /// Release the dataset; calling it again does nothing
    fn close(&mut self) -> Result<()>;
}

/// Reader calling a storage backend in the current process
pub struct SyncReader {
    path: String,
    storage: Option<Box<dyn DatasetStorage>>,
    shape: Shape,
    options: ReadOptions,
}

impl SyncReader {
    /// Open `path` through `backend`
    pub fn open(backend: &dyn StorageBackend, path: &str, options: ReadOptions) -> Result<Self> {
        let storage = backend.open_dataset(path, &options)?;
        if storage.element_type() != options.element() {
            return Err(Error::TypeMismatch(format!(
                "dataset {path} holds {} values, {} requested",
                storage.element_type(),
                options.element()
            )));
        }
        let shape = storage.shape();
        debug!(path, %shape, "opened dataset");
        Ok(Self {
            path: path.to_string(),
            storage: Some(storage),
            shape,
            options,
        })
    }

    /// Dataset path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn storage(&mut self) -> Result<&mut Box<dyn DatasetStorage>> {
        self.storage
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument(format!("dataset {} is closed", self.path)))
    }

    fn finish(&self, dims: Shape, buffer: Buffer, row_width: usize) -> Result<DatasetData> {
        let data = DatasetData {
            dset_dims: self.shape.clone(),
            dims,
            buffer,
        };
        data.check_consistent(Some(row_width).filter(|w| *w > 0))
            .map_err(|e| Error::Backend(format!("dataset {}: {e}", self.path)))?;
        Ok(data)
    }
}

impl std::fmt::Debug for SyncReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReader")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("open", &self.storage.is_some())
            .finish()
    }
}

impl DatasetReader for SyncReader {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn options(&self) -> &ReadOptions {
        &self.options
    }

    fn read(&mut self) -> Result<DatasetData> {
        let buffer = self.storage()?.read_full()?;
        self.finish(self.shape.clone(), buffer, self.options.row_width())
    }

    fn read_subset(&mut self, slab: &Hyperslab) -> Result<DatasetData> {
        slab.validate(&self.shape)?;
        let row_width = self.options.subset_row_width(slab.cols)?;
        let buffer = self.storage()?.read_hyperslab(slab)?;
        self.finish(slab.shape(), buffer, row_width)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut storage) = self.storage.take() {
            debug!(path = %self.path, "closing dataset");
            storage.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use dsetio_core::schema::{ElementType, StrColumns};
    use dsetio_core::selection::IndexRange;

    fn reader() -> SyncReader {
        let store = MemoryStorage::new();
        store
            .insert("/m", Shape::new(vec![3, 2]), Buffer::Float32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
            .unwrap();
        SyncReader::open(&store, "/m", ReadOptions::new(ElementType::Float32)).unwrap()
    }

    #[test]
    fn test_read_and_subset() {
        let mut reader = reader();
        let full = reader.read().unwrap();
        assert_eq!(full.dims, full.dset_dims);

        let slab = Hyperslab::new(IndexRange::new(2, 2), IndexRange::new(0, 1));
        let part = reader.read_subset(&slab).unwrap();
        assert_eq!(part.dims.dims(), &[1, 2]);
        assert_eq!(part.dset_dims.dims(), &[3, 2]);
        assert_eq!(part.buffer, Buffer::Float32(vec![5.0, 6.0]));
    }

    #[test]
    fn test_read_into_caller_buffer() {
        let mut reader = reader();
        let mut dest = Buffer::allocate(ElementType::Float32, &Shape::new(vec![2, 1]), 0);
        let slab = Hyperslab::new(IndexRange::new(0, 1), IndexRange::new(1, 1));
        let dims = reader.read_subset_into(&slab, &mut dest).unwrap();
        assert_eq!(dims.dims(), &[2, 1]);
        assert_eq!(dest, Buffer::Float32(vec![2.0, 4.0]));

        let mut wrong = Buffer::allocate(ElementType::Float32, &Shape::new(vec![1]), 0);
        assert!(reader.read_into(&mut wrong).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reader = reader();
        reader.close().unwrap();
        reader.close().unwrap();
        assert!(reader.read().is_err());
    }

    #[test]
    fn test_string_subset_of_some_columns() {
        let store = MemoryStorage::new();
        store
            .insert("/tags", Shape::new(vec![2, 3]), Buffer::Bytes(b"ab\0cdefxzpquv\0\0w".to_vec()))
            .unwrap();
        let options = ReadOptions::builder(ElementType::FixedString)
            .str_columns(StrColumns::new(vec![3, 4, 1]))
            .build()
            .unwrap();
        let mut reader = SyncReader::open(&store, "/tags", options).unwrap();

        let slab = Hyperslab::new(IndexRange::new(0, 1), IndexRange::new(1, 2));
        let part = reader.read_subset(&slab).unwrap();
        assert_eq!(part.dims.dims(), &[2, 2]);
        assert_eq!(part.buffer, Buffer::Bytes(b"cdefxuv\0\0w".to_vec()));

        let slab = Hyperslab::new(IndexRange::new(1, 1), IndexRange::new(0, 0));
        assert_eq!(reader.read_subset(&slab).unwrap().buffer, Buffer::Bytes(b"zpq".to_vec()));
    }
}
