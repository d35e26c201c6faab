//! Choosing between the direct and the out-of-process reader

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dsetio_core::backend::StorageBackend;
use dsetio_core::error::Result;
use dsetio_core::options::ReadOptions;
use dsetio_transfer::TransferConfig;

use crate::async_reader::AsyncReader;
use crate::dataset::DatasetHandle;
use crate::reader::{DatasetReader, SyncReader};

/// Where a dataset handle gets its data from
#[derive(Clone)]
pub enum ReaderSource {
    /// Call a storage backend in this process
    Direct(Arc<dyn StorageBackend>),

    /// Run every read in a worker process against the store at `file`
    OutOfProcess {
        /// Transfer configuration
        config: Arc<TransferConfig>,
        /// Store path handed to the worker
        file: PathBuf,
    },
}

impl ReaderSource {
    /// Out-of-process source using the installed process-wide transfer configuration
    pub fn out_of_process(file: impl Into<PathBuf>) -> Result<Self> {
        Ok(ReaderSource::OutOfProcess {
            config: TransferConfig::global()?,
            file: file.into(),
        })
    }

    /// Open a bare reader for `path`
    pub fn open_reader(&self, path: &str, options: ReadOptions) -> Result<Box<dyn DatasetReader>> {
        Ok(match self {
            ReaderSource::Direct(backend) => Box::new(SyncReader::open(backend.as_ref(), path, options)?),
            ReaderSource::OutOfProcess { config, file } => Box::new(AsyncReader::open(
                Arc::clone(config),
                file.clone(),
                path,
                options,
            )?),
        })
    }

    /// Open a windowed handle for `path`
    pub fn open(&self, path: &str, options: ReadOptions) -> Result<DatasetHandle> {
        DatasetHandle::new(self.open_reader(path, options)?)
    }
}

impl fmt::Debug for ReaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderSource::Direct(_) => f.write_str("Direct"),
            ReaderSource::OutOfProcess { config, file } => f
                .debug_struct("OutOfProcess")
                .field("worker", &config.worker())
                .field("file", file)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use dsetio_core::buffer::Buffer;
    use dsetio_core::schema::{ElementType, Shape};

    #[test]
    fn test_direct_source_opens_handle() {
        let store = MemoryStorage::new();
        store
            .insert("/v", Shape::new(vec![2, 2]), Buffer::Int32(vec![1, 2, 3, 4]))
            .unwrap();
        let source = ReaderSource::Direct(Arc::new(store));

        let mut handle = source.open("/v", ReadOptions::new(ElementType::Int32)).unwrap();
        assert_eq!(handle.dimensions().dims(), &[2, 2]);
        assert_eq!(handle.read_column::<i32>(1).unwrap(), vec![2, 4]);
    }
}
