//! Reader that offloads every read to a worker process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dsetio_core::buffer::DatasetData;
use dsetio_core::error::{Error, Result};
use dsetio_core::options::ReadOptions;
use dsetio_core::schema::Shape;
use dsetio_core::selection::Hyperslab;
use dsetio_transfer::{CancelToken, TransferBatch, TransferConfig, TransferRequest};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::reader::DatasetReader;

/// Blocking reader whose reads run as out-of-process transfers
///
/// The reader owns a small runtime to drive transfers, so it must be opened,
/// used through its blocking methods and dropped outside of any other tokio
/// runtime. [`AsyncReader::fetch`] is the way to read from async code.
pub struct AsyncReader {
    config: Arc<TransferConfig>,
    file: PathBuf,
    path: String,
    options: ReadOptions,
    shape: Shape,
    runtime: Runtime,
    closed: bool,
}

impl AsyncReader {
    /// Open `path` in the store at `file`, learning its shape with a dimensions-only transfer
    pub fn open(
        config: Arc<TransferConfig>,
        file: impl Into<PathBuf>,
        path: &str,
        options: ReadOptions,
    ) -> Result<Self> {
        config.validate()?;
        ensure_blocking()?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let mut reader = Self {
            config,
            file: file.into(),
            path: path.to_string(),
            options,
            shape: Shape::default(),
            runtime,
            closed: false,
        };

        let dims = reader.block_on(reader.request().dims_only())?;
        reader.shape = dims.dset_dims;
        debug!(path, shape = %reader.shape, "opened dataset out of process");
        Ok(reader)
    }

    /// Source store path
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Read the whole dataset, or `subset`, from within an async context
    pub async fn fetch(&self, subset: Option<Hyperslab>) -> Result<DatasetData> {
        let request = match subset {
            Some(slab) => {
                slab.validate(&self.shape)?;
                self.request().with_subset(slab)
            }
            None => self.request(),
        };
        let data = dsetio_transfer::run(&self.config, request, CancelToken::never()).await?;
        self.check(data, subset)
    }

    /// Read several subsets concurrently, one worker each
    pub fn read_subsets(&mut self, slabs: &[Hyperslab]) -> Result<Vec<DatasetData>> {
        self.ensure_open()?;
        ensure_blocking()?;
        for slab in slabs {
            slab.validate(&self.shape)?;
        }

        let mut batch = TransferBatch::new(Arc::clone(&self.config));
        batch.extend(slabs.iter().map(|slab| self.request().with_subset(*slab)));
        let results = self.runtime.block_on(batch.run_all())?;

        results
            .into_iter()
            .zip(slabs)
            .map(|(data, slab)| self.check(data, Some(*slab)))
            .collect()
    }

    fn request(&self) -> TransferRequest {
        TransferRequest::dataset(&self.file, &self.path, self.options.element())
            .with_str_columns(self.options.str_columns().clone())
    }

    fn block_on(&self, request: TransferRequest) -> Result<DatasetData> {
        self.ensure_open()?;
        ensure_blocking()?;
        self.runtime.block_on(dsetio_transfer::run(
            &self.config,
            request,
            CancelToken::never(),
        ))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidArgument(format!("dataset {} is closed", self.path)));
        }
        Ok(())
    }

    fn check(&self, data: DatasetData, subset: Option<Hyperslab>) -> Result<DatasetData> {
        check_transfer(&self.shape, &self.options, data, subset)
    }
}

/// Check a transfer result against the dataset shape and what was asked for
fn check_transfer(
    shape: &Shape,
    options: &ReadOptions,
    data: DatasetData,
    subset: Option<Hyperslab>,
) -> Result<DatasetData> {
    let expected = subset.map_or_else(|| shape.clone(), |s| s.shape());
    if data.dset_dims != *shape || data.dims.element_count() != expected.element_count() {
        return Err(Error::DecodeStream(format!(
            "worker returned dims {} of {}, expected {expected} of {shape}",
            data.dims, data.dset_dims
        )));
    }
    let row_width = match subset {
        Some(slab) => options.subset_row_width(slab.cols)?,
        None => options.row_width(),
    };
    data.check_consistent(Some(row_width).filter(|w| *w > 0))
        .map_err(|e| Error::DecodeStream(e.to_string()))?;
    Ok(data)
}

fn ensure_blocking() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(Error::InvalidArgument(
            "blocking dataset reads cannot run inside an async runtime, use fetch".into(),
        ));
    }
    Ok(())
}

impl std::fmt::Debug for AsyncReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncReader")
            .field("file", &self.file)
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl DatasetReader for AsyncReader {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn options(&self) -> &ReadOptions {
        &self.options
    }

    fn read(&mut self) -> Result<DatasetData> {
        let data = self.block_on(self.request())?;
        self.check(data, None)
    }

    fn read_subset(&mut self, slab: &Hyperslab) -> Result<DatasetData> {
        slab.validate(&self.shape)?;
        let data = self.block_on(self.request().with_subset(*slab))?;
        self.check(data, Some(*slab))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsetio_core::buffer::Buffer;
    use dsetio_core::schema::{ElementType, StrColumns};
    use dsetio_core::selection::IndexRange;

    #[test]
    fn test_unconfigured_worker_fails_before_spawning() {
        let config = Arc::new(TransferConfig::new(""));
        let err = AsyncReader::open(config, "/data/store", "/x", ReadOptions::new(ElementType::Float64))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_blocking_open_inside_runtime_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(TransferConfig::new("/bin/true").with_pipe_root(dir.path()));
        let err = AsyncReader::open(config, "/data/store", "/x", ReadOptions::new(ElementType::Int32))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_string_column_subset_is_checked_against_its_own_width() {
        let shape = Shape::new(vec![2, 2]);
        let options = ReadOptions::builder(ElementType::FixedString)
            .str_columns(StrColumns::new(vec![3, 4]))
            .build()
            .unwrap();
        let slab = Hyperslab::new(IndexRange::new(0, 1), IndexRange::new(1, 1));
        let data = DatasetData {
            dset_dims: shape.clone(),
            dims: slab.shape(),
            buffer: Buffer::Bytes(b"cde\0hi\0\0".to_vec()),
        };
        let checked = check_transfer(&shape, &options, data.clone(), Some(slab)).unwrap();
        assert_eq!(checked, data);

        let short = DatasetData {
            buffer: Buffer::Bytes(b"cde\0hi".to_vec()),
            ..data
        };
        assert!(matches!(
            check_transfer(&shape, &options, short, Some(slab)),
            Err(Error::DecodeStream(_))
        ));
    }

    #[test]
    fn test_mismatched_dims_are_a_stream_error() {
        let shape = Shape::new(vec![3]);
        let data = DatasetData {
            dset_dims: Shape::new(vec![4]),
            dims: Shape::new(vec![4]),
            buffer: Buffer::Float64(vec![0.0; 4]),
        };
        let options = ReadOptions::new(ElementType::Float64);
        assert!(matches!(
            check_transfer(&shape, &options, data, None),
            Err(Error::DecodeStream(_))
        ));
    }
}
