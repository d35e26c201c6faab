//! In-memory storage backend

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dsetio_core::backend::{CompoundStorage, DatasetStorage, StorageBackend};
use dsetio_core::buffer::Buffer;
use dsetio_core::error::{Error, Result};
use dsetio_core::options::ReadOptions;
use dsetio_core::schema::{ElementType, Shape, StrColumns};
use dsetio_core::selection::Hyperslab;

use crate::slice;

#[derive(Debug)]
struct StoredDataset {
    shape: Shape,
    buffer: Buffer,
}

#[derive(Debug)]
struct StoredCompound {
    members: Vec<String>,
    packed: Vec<u8>,
    count: usize,
}

#[derive(Debug, Default)]
struct Inner {
    datasets: HashMap<String, Arc<StoredDataset>>,
    compounds: HashMap<String, Arc<StoredCompound>>,
}

/// Storage backend keeping every dataset in memory
///
/// Cloning shares the same datasets.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the dataset at `path`
    pub fn insert(&self, path: impl Into<String>, shape: Shape, buffer: Buffer) -> Result<()> {
        if let Buffer::Bytes(_) = buffer {
            if shape.rows() > 0 && buffer.len() % shape.rows() != 0 {
                return Err(Error::InvalidArgument(format!(
                    "{} string bytes do not split into {} rows",
                    buffer.len(),
                    shape.rows()
                )));
            }
        } else if buffer.len() != shape.element_count() {
            return Err(Error::InvalidArgument(format!(
                "shape {shape} needs {} elements, buffer holds {}",
                shape.element_count(),
                buffer.len()
            )));
        }
        self.write()?
            .datasets
            .insert(path.into(), Arc::new(StoredDataset { shape, buffer }));
        Ok(())
    }

    /// Add or replace the compound dataset at `path`
    pub fn insert_compound(
        &self,
        path: impl Into<String>,
        members: Vec<String>,
        packed: Vec<u8>,
        count: usize,
    ) -> Result<()> {
        self.write()?.compounds.insert(
            path.into(),
            Arc::new(StoredCompound {
                members,
                packed,
                count,
            }),
        );
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::Backend("memory storage lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::Backend("memory storage lock poisoned".into()))
    }
}

impl StorageBackend for MemoryStorage {
    fn open_dataset(&self, path: &str, options: &ReadOptions) -> Result<Box<dyn DatasetStorage>> {
        let stored = self
            .read()?
            .datasets
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("dataset {path} does not exist")))?;

        let element = stored.buffer.element_type();
        if element != options.element() {
            return Err(Error::TypeMismatch(format!(
                "dataset {path} holds {element} values, {} requested",
                options.element()
            )));
        }
        if element == ElementType::FixedString
            && stored.buffer.len() != stored.shape.rows() * options.row_width()
        {
            return Err(Error::TypeMismatch(format!(
                "dataset {path} rows are not {} bytes wide",
                options.row_width()
            )));
        }

        Ok(Box::new(MemoryDataset {
            stored,
            columns: options.str_columns().clone(),
        }))
    }

    fn open_compound(&self, path: &str) -> Result<Box<dyn CompoundStorage>> {
        let stored = self
            .read()?
            .compounds
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("compound dataset {path} does not exist")))?;
        Ok(Box::new(MemoryCompound { stored }))
    }
}

struct MemoryDataset {
    stored: Arc<StoredDataset>,
    columns: StrColumns,
}

impl DatasetStorage for MemoryDataset {
    fn shape(&self) -> Shape {
        self.stored.shape.clone()
    }

    fn element_type(&self) -> ElementType {
        self.stored.buffer.element_type()
    }

    fn read_full(&mut self) -> Result<Buffer> {
        Ok(self.stored.buffer.clone())
    }

    fn read_hyperslab(&mut self, slab: &Hyperslab) -> Result<Buffer> {
        slice::extract(&self.stored.buffer, &self.stored.shape, slab, &self.columns)
    }
}

struct MemoryCompound {
    stored: Arc<StoredCompound>,
}

impl CompoundStorage for MemoryCompound {
    fn record_count(&self) -> usize {
        self.stored.count
    }

    fn member_names(&self) -> Result<Vec<String>> {
        Ok(self.stored.members.clone())
    }

    fn read_packed(&mut self) -> Result<Vec<u8>> {
        Ok(self.stored.packed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsetio_core::selection::IndexRange;

    #[test]
    fn test_open_checks_element_type() {
        let store = MemoryStorage::new();
        store
            .insert("/a", Shape::new(vec![2]), Buffer::Float64(vec![1.0, 2.0]))
            .unwrap();

        assert!(store.open_dataset("/a", &ReadOptions::new(ElementType::Float64)).is_ok());
        assert!(matches!(
            store.open_dataset("/a", &ReadOptions::new(ElementType::Int32)),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            store.open_dataset("/missing", &ReadOptions::new(ElementType::Float64)),
            Err(Error::Backend(_))
        ));
    }

    #[test]
    fn test_insert_checks_length() {
        let store = MemoryStorage::new();
        let result = store.insert("/a", Shape::new(vec![2, 2]), Buffer::Int32(vec![1, 2, 3]));
        assert!(result.is_err());
    }

    #[test]
    fn test_hyperslab_read() {
        let store = MemoryStorage::new();
        store
            .insert("/g", Shape::new(vec![3, 2]), Buffer::Int32(vec![1, 2, 3, 4, 5, 6]))
            .unwrap();
        let mut dataset = store.open_dataset("/g", &ReadOptions::new(ElementType::Int32)).unwrap();
        let slab = Hyperslab::new(IndexRange::new(1, 2), IndexRange::new(0, 0));
        assert_eq!(dataset.read_hyperslab(&slab).unwrap(), Buffer::Int32(vec![3, 5]));
    }
}
