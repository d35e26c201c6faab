//! Read-only directory store of raw dataset files
//!
//! A dataset path `/a/b` maps to `<root>/a/b.raw`. Each file starts with a
//! 32-byte little-endian header followed by the row-major element data:
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | magic `DSRW`                           |
//! | 4      | 2    | format version                         |
//! | 6      | 2    | element type selector                  |
//! | 8      | 8    | rows                                   |
//! | 16     | 8    | columns, 0 for a one-dimensional array |
//! | 24     | 8    | bytes per row                          |

use std::path::{Component, Path, PathBuf};

use dsetio_core::backend::{DatasetStorage, StorageBackend};
use dsetio_core::buffer::Buffer;
use dsetio_core::bytes;
use dsetio_core::error::{Error, Result};
use dsetio_core::io::MemoryMappedFile;
use dsetio_core::options::ReadOptions;
use dsetio_core::schema::{ElementType, Shape, StrColumns};
use dsetio_core::selection::Hyperslab;
use static_assertions::const_assert_eq;
use tracing::debug;

/// File magic
pub const RAW_MAGIC: [u8; 4] = *b"DSRW";

/// Current format version
pub const RAW_VERSION: u16 = 1;

/// Header length in bytes
pub const RAW_HEADER_LEN: usize = 32;

const_assert_eq!(RAW_HEADER_LEN, 4 + 2 + 2 + 8 + 8 + 8);

/// Extension of dataset files
pub const RAW_EXTENSION: &str = "raw";

/// Header of a raw dataset file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    /// Element type of the data
    pub element: ElementType,
    /// Number of rows
    pub rows: u64,
    /// Number of columns, 0 for one-dimensional data
    pub cols: u64,
    /// Bytes per row
    pub row_width: u64,
}

impl RawHeader {
    /// Header describing `shape`; `row_width` is only used for string data
    pub fn new(element: ElementType, shape: &Shape, row_width: usize) -> Self {
        let cols = if shape.dims().len() == 1 { 0 } else { shape.cols() };
        let row_width = match element.size_bytes() {
            Some(size) => shape.cols() * size,
            None => row_width,
        };
        Self {
            element,
            rows: shape.rows() as u64,
            cols: cols as u64,
            row_width: row_width as u64,
        }
    }

    /// Encode the header
    pub fn to_bytes(&self) -> [u8; RAW_HEADER_LEN] {
        let mut out = [0u8; RAW_HEADER_LEN];
        out[0..4].copy_from_slice(&RAW_MAGIC);
        out[4..6].copy_from_slice(&RAW_VERSION.to_le_bytes());
        // Selector codes are all below 256.
        out[6..8].copy_from_slice(&(self.element.code() as u16).to_le_bytes());
        out[8..16].copy_from_slice(&self.rows.to_le_bytes());
        out[16..24].copy_from_slice(&self.cols.to_le_bytes());
        out[24..32].copy_from_slice(&self.row_width.to_le_bytes());
        out
    }

    /// Decode a header from the start of `raw`
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let raw = raw.get(..RAW_HEADER_LEN).ok_or(Error::BufferTooShort {
            needed: RAW_HEADER_LEN,
            actual: raw.len(),
        })?;
        if raw[0..4] != RAW_MAGIC {
            return Err(Error::Backend("not a raw dataset file".into()));
        }
        let version = bytes::u16_from_le(&raw[4..6])?;
        if version != RAW_VERSION {
            return Err(Error::Backend(format!("unsupported raw format version {version}")));
        }
        let header = Self {
            element: ElementType::from_code(u32::from(bytes::u16_from_le(&raw[6..8])?))?,
            rows: bytes::u64_from_le(&raw[8..16])?,
            cols: bytes::u64_from_le(&raw[16..24])?,
            row_width: bytes::u64_from_le(&raw[24..32])?,
        };
        if let Some(size) = header.element.size_bytes() {
            let expected = header.cols.max(1).checked_mul(size as u64);
            if expected != Some(header.row_width) {
                return Err(Error::Backend(format!(
                    "row width {} does not match {} columns of {}",
                    header.row_width, header.cols, header.element
                )));
            }
        }
        Ok(header)
    }

    /// Dataset shape
    pub fn shape(&self) -> Shape {
        let rows = self.rows as usize;
        if self.cols == 0 {
            Shape::new(vec![rows])
        } else {
            Shape::new(vec![rows, self.cols as usize])
        }
    }

    /// Bytes of element data following the header
    pub fn data_len(&self) -> Result<usize> {
        self.rows
            .checked_mul(self.row_width)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::Backend("raw dataset is too large to address".into()))
    }
}

/// Encode a complete raw dataset file
pub fn encode_dataset(shape: &Shape, buffer: &Buffer) -> Result<Vec<u8>> {
    let element = buffer.element_type();
    let row_width = match (element, shape.rows()) {
        (ElementType::FixedString, rows) if rows > 0 => buffer.len() / rows,
        _ => 0,
    };
    let header = RawHeader::new(element, shape, row_width);
    if header.data_len()? != buffer_bytes(buffer) {
        return Err(Error::InvalidArgument(format!(
            "buffer of {} elements does not fill shape {shape}",
            buffer.len()
        )));
    }

    let mut out = Vec::with_capacity(RAW_HEADER_LEN + buffer_bytes(buffer));
    out.extend_from_slice(&header.to_bytes());
    match buffer {
        Buffer::Float32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::Float64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::Bytes(v) => out.extend_from_slice(v),
    }
    Ok(out)
}

fn buffer_bytes(buffer: &Buffer) -> usize {
    buffer.len() * buffer.element_type().size_bytes().unwrap_or(1)
}

/// Storage backend over a directory of raw dataset files
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Backend(format!(
                "store {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the dataset at `path`
    pub fn dataset_file(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || relative.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(format!("invalid dataset path {path:?}")));
        }
        let mut file = self.root.join(relative).into_os_string();
        file.push(".");
        file.push(RAW_EXTENSION);
        Ok(PathBuf::from(file))
    }
}

impl StorageBackend for DirStore {
    fn open_dataset(&self, path: &str, options: &ReadOptions) -> Result<Box<dyn DatasetStorage>> {
        let file_path = self.dataset_file(path)?;
        let file = MemoryMappedFile::open(&file_path)
            .map_err(|e| Error::Backend(format!("cannot open dataset {path}: {e}")))?;
        let header = RawHeader::parse(file.as_slice())?;

        if header.element != options.element() {
            return Err(Error::TypeMismatch(format!(
                "dataset {path} holds {} values, {} requested",
                header.element,
                options.element()
            )));
        }
        if header.element == ElementType::FixedString
            && header.row_width != options.row_width() as u64
        {
            return Err(Error::TypeMismatch(format!(
                "dataset {path} rows are {} bytes wide, the column widths add up to {}",
                header.row_width,
                options.row_width()
            )));
        }
        let available = file.size() - RAW_HEADER_LEN;
        if available < header.data_len()? {
            return Err(Error::Backend(format!(
                "dataset {path} is truncated: {available} of {} data bytes present",
                header.data_len()?
            )));
        }

        debug!(path, file = %file_path.display(), shape = %header.shape(), "opened raw dataset");
        Ok(Box::new(RawDataset {
            file: Some(file),
            header,
            columns: options.str_columns().clone(),
        }))
    }
}

struct RawDataset {
    file: Option<MemoryMappedFile>,
    header: RawHeader,
    columns: StrColumns,
}

impl RawDataset {
    fn file(&self) -> Result<&MemoryMappedFile> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::Backend("raw dataset is closed".into()))
    }
}

impl DatasetStorage for RawDataset {
    fn shape(&self) -> Shape {
        self.header.shape()
    }

    fn element_type(&self) -> ElementType {
        self.header.element
    }

    fn read_full(&mut self) -> Result<Buffer> {
        let data = self.file()?.slice(RAW_HEADER_LEN, self.header.data_len()?)?;
        Buffer::from_le_bytes(self.header.element, data)
    }

    fn read_hyperslab(&mut self, slab: &Hyperslab) -> Result<Buffer> {
        slab.validate(&self.header.shape())?;
        let row_width = self.header.row_width as usize;
        let (offset, width) = match self.header.element.size_bytes() {
            Some(size) => (slab.cols.start * size, slab.cols.len() * size),
            None => (
                self.columns.offset_of(slab.cols.start)?,
                self.columns.slice(slab.cols.start..=slab.cols.end)?.row_width(),
            ),
        };

        let file = self.file()?;
        let mut raw = Vec::with_capacity(slab.rows.len() * width);
        for row in slab.rows.start..=slab.rows.end {
            raw.extend_from_slice(file.slice(RAW_HEADER_LEN + row * row_width + offset, width)?);
        }
        Buffer::from_le_bytes(self.header.element, &raw)
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsetio_core::selection::IndexRange;

    fn store_with(path: &str, shape: &Shape, buffer: &Buffer) -> (tempfile::TempDir, DirStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let file = store.dataset_file(path).unwrap();
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, encode_dataset(shape, buffer).unwrap()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_header_layout() {
        let header = RawHeader::new(ElementType::Float64, &Shape::new(vec![5, 3]), 0);
        let raw = header.to_bytes();
        assert_eq!(&raw[..4], b"DSRW");
        assert_eq!(u16::from_le_bytes([raw[6], raw[7]]), 14);
        assert_eq!(header.row_width, 24);
        assert_eq!(RawHeader::parse(&raw).unwrap(), header);
        assert!(RawHeader::parse(&raw[..31]).is_err());
    }

    #[test]
    fn test_overflowing_column_count_is_rejected() {
        let mut raw = RawHeader::new(ElementType::Float64, &Shape::new(vec![2, 2]), 0).to_bytes();
        raw[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(RawHeader::parse(&raw), Err(Error::Backend(_))));
    }

    #[test]
    fn test_one_dimensional_shape_survives() {
        let shape = Shape::new(vec![3]);
        let (_dir, store) = store_with("/x", &shape, &Buffer::Float64(vec![1.0, 2.0, 3.0]));
        let mut dataset = store
            .open_dataset("/x", &ReadOptions::new(ElementType::Float64))
            .unwrap();
        assert_eq!(dataset.shape(), shape);
        assert_eq!(dataset.read_full().unwrap(), Buffer::Float64(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_hyperslab_from_nested_path() {
        let shape = Shape::new(vec![3, 4]);
        let buffer = Buffer::Int32((0..12).collect());
        let (_dir, store) = store_with("/grp/vals", &shape, &buffer);
        let mut dataset = store
            .open_dataset("/grp/vals", &ReadOptions::new(ElementType::Int32))
            .unwrap();
        let slab = Hyperslab::new(IndexRange::new(1, 2), IndexRange::new(2, 3));
        assert_eq!(dataset.read_hyperslab(&slab).unwrap(), Buffer::Int32(vec![6, 7, 10, 11]));

        dataset.close().unwrap();
        assert!(matches!(dataset.read_full(), Err(Error::Backend(_))));
    }

    #[test]
    fn test_string_hyperslab() {
        let shape = Shape::new(vec![2, 2]);
        let buffer = Buffer::Bytes(b"ab cde\0fg hi\0\0".to_vec());
        let (_dir, store) = store_with("/names", &shape, &buffer);
        let options = ReadOptions::builder(ElementType::FixedString)
            .str_columns(StrColumns::new(vec![3, 4]))
            .build()
            .unwrap();
        let mut dataset = store.open_dataset("/names", &options).unwrap();
        let slab = Hyperslab::new(IndexRange::new(0, 1), IndexRange::new(1, 1));
        assert_eq!(dataset.read_hyperslab(&slab).unwrap(), Buffer::Bytes(b"cde\0hi\0\0".to_vec()));
    }

    #[test]
    fn test_open_rejects_mismatches() {
        let (_dir, store) = store_with("/x", &Shape::new(vec![2]), &Buffer::Int32(vec![1, 2]));
        assert!(matches!(
            store.open_dataset("/x", &ReadOptions::new(ElementType::Float32)),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            store.open_dataset("/y", &ReadOptions::new(ElementType::Int32)),
            Err(Error::Backend(_))
        ));
        assert!(store.dataset_file("/../etc/passwd").is_err());
        assert!(store.dataset_file("/v1.2").unwrap().ends_with("v1.2.raw"));
    }
}
