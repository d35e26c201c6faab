//! Dataset handles with incremental-window row and column access
//!
//! A handle owns one resident buffer plus the region of the dataset it
//! holds. Row and column reads are served from that buffer whenever the
//! requested index lies inside the resident window; otherwise the handle
//! fetches a new window through its reader and replaces the buffer. A failed
//! fetch leaves the previous buffer and window in place.

use dsetio_core::buffer::{Buffer, DatasetData, Element};
use dsetio_core::error::{Error, Result};
use dsetio_core::options::ReadOptions;
use dsetio_core::schema::{ElementType, Shape, StrColumns};
use dsetio_core::selection::{Axis, Hyperslab, IndexRange};
use tracing::debug;

use crate::reader::DatasetReader;
use crate::slice;

/// An open dataset with its resident buffer
pub struct DatasetHandle {
    reader: Box<dyn DatasetReader>,
    options: ReadOptions,
    dset_dims: Shape,
    dims: Shape,
    buffer: Buffer,
    resident: Option<Hyperslab>,
    closed: bool,
}

impl DatasetHandle {
    /// Wrap `reader`, loading the whole dataset if the options ask for it
    pub fn new(reader: Box<dyn DatasetReader>) -> Result<Self> {
        let options = reader.options().clone();
        let dset_dims = reader.shape().clone();

        if options.element() == ElementType::FixedString
            && options.str_columns().len() != dset_dims.cols()
        {
            return Err(Error::InvalidArgument(format!(
                "{} string column widths given for a dataset with {} columns",
                options.str_columns().len(),
                dset_dims.cols()
            )));
        }

        let mut handle = Self {
            buffer: Buffer::empty(options.element()),
            reader,
            options,
            dset_dims,
            dims: Shape::default(),
            resident: None,
            closed: false,
        };
        if handle.options.read_on_create() {
            handle.read()?;
        }
        Ok(handle)
    }

    /// Shape of the whole dataset
    pub fn dimensions(&self) -> &Shape {
        &self.dset_dims
    }

    /// Shape of the resident buffer
    pub fn dims(&self) -> &Shape {
        &self.dims
    }

    /// The resident buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Options the handle was opened with
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Resident index range along the incremental axis (rows when not incremental)
    ///
    /// `None` until something has been loaded.
    pub fn window(&self) -> Option<IndexRange> {
        let axis = self.options.incremental().map_or(Axis::Row, |inc| inc.axis);
        self.resident.map(|slab| slab.range(axis))
    }

    /// Load the whole dataset, replacing the resident buffer
    pub fn read(&mut self) -> Result<&Buffer> {
        self.ensure_open()?;
        let data = self.reader.read()?;
        let full = Hyperslab::full(&self.dset_dims);
        Ok(self.install(data, full))
    }

    /// Load the region `slab`, replacing the resident buffer
    pub fn read_subset(&mut self, slab: &Hyperslab) -> Result<&Buffer> {
        self.ensure_open()?;
        let data = self.reader.read_subset(slab)?;
        Ok(self.install(data, Some(*slab)))
    }

    /// Read the whole dataset into `dest` without touching the resident buffer
    pub fn read_into(&mut self, dest: &mut Buffer) -> Result<Shape> {
        self.ensure_open()?;
        self.reader.read_into(dest)
    }

    /// Read `slab` into `dest` without touching the resident buffer
    pub fn read_subset_into(&mut self, slab: &Hyperslab, dest: &mut Buffer) -> Result<Shape> {
        self.ensure_open()?;
        self.reader.read_subset_into(slab, dest)
    }

    /// Values of row `index`
    pub fn read_row<T: Element>(&mut self, index: usize) -> Result<Vec<T>> {
        self.check_element(T::TYPE)?;
        let slab = self.ensure_resident(Axis::Row, index)?;
        let data = self.buffer.as_slice::<T>()?;
        slice::row(data, slab.cols.len(), index - slab.rows.start)
    }

    /// Values of column `index`
    pub fn read_column<T: Element>(&mut self, index: usize) -> Result<Vec<T>> {
        self.check_element(T::TYPE)?;
        let slab = self.ensure_resident(Axis::Column, index)?;
        let data = self.buffer.as_slice::<T>()?;
        slice::column(data, slab.rows.len(), slab.cols.len(), index - slab.cols.start)
    }

    /// Fields of string row `index`, trimmed of padding
    pub fn read_string_row(&mut self, index: usize) -> Result<Vec<String>> {
        self.check_element(ElementType::FixedString)?;
        let slab = self.ensure_resident(Axis::Row, index)?;
        let columns = self.resident_columns(&slab)?;
        slice::string_row(self.buffer.as_bytes()?, &columns, index - slab.rows.start)
    }

    /// Fields of string column `index` for every row, trimmed of padding
    pub fn read_string_column(&mut self, index: usize) -> Result<Vec<String>> {
        self.check_element(ElementType::FixedString)?;
        let slab = self.ensure_resident(Axis::Column, index)?;
        let columns = self.resident_columns(&slab)?;
        slice::string_column(
            self.buffer.as_bytes()?,
            &columns,
            slab.rows.len(),
            index - slab.cols.start,
        )
    }

    /// Release the reader; calling it again does nothing
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.resident = None;
        self.dims = Shape::default();
        self.buffer = Buffer::empty(self.options.element());
        self.reader.close()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidArgument("dataset handle is closed".into()));
        }
        Ok(())
    }

    fn check_element(&self, requested: ElementType) -> Result<()> {
        if requested != self.options.element() {
            return Err(Error::TypeMismatch(format!(
                "requested {requested} values from a {} dataset",
                self.options.element()
            )));
        }
        Ok(())
    }

    fn install(&mut self, data: DatasetData, region: Option<Hyperslab>) -> &Buffer {
        self.dims = data.dims;
        self.buffer = data.buffer;
        self.resident = region;
        &self.buffer
    }

    /// Resident region if it spans the whole of the axis other than `axis`
    fn resident_along(&self, axis: Axis) -> Option<Hyperslab> {
        let other = axis.other();
        self.resident
            .filter(|slab| slab.range(other).covers(other.extent(&self.dset_dims)))
    }

    /// Make `index` along `axis` resident, returning the resident region
    fn ensure_resident(&mut self, axis: Axis, index: usize) -> Result<Hyperslab> {
        self.ensure_open()?;
        let extent = axis.extent(&self.dset_dims);
        if let Some(inc) = self.options.incremental() {
            if inc.axis != axis {
                return Err(Error::AxisMismatch {
                    configured: inc.axis,
                    requested: axis,
                });
            }
        }
        if index >= extent {
            return Err(Error::index_out_of_range(axis, index, extent));
        }

        if let Some(slab) = self.resident_along(axis) {
            if slab.range(axis).contains(index) {
                return Ok(slab);
            }
        }

        match self.options.incremental() {
            Some(inc) => {
                let range = IndexRange::window(index, inc.window, extent);
                let slab = Hyperslab::along(axis, range, &self.dset_dims)
                    .ok_or_else(|| Error::index_out_of_range(axis.other(), 0, 0))?;
                debug!(%axis, start = range.start, end = range.end, "fetching window");
                self.read_subset(&slab)?;
                Ok(slab)
            }
            None => {
                debug!(%axis, index, "loading full dataset");
                self.read()?;
                self.resident
                    .ok_or_else(|| Error::index_out_of_range(axis, index, 0))
            }
        }
    }

    fn resident_columns(&self, slab: &Hyperslab) -> Result<StrColumns> {
        self.options
            .str_columns()
            .slice(slab.cols.start..=slab.cols.end)
    }
}

impl std::fmt::Debug for DatasetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetHandle")
            .field("dset_dims", &self.dset_dims)
            .field("dims", &self.dims)
            .field("resident", &self.resident)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::reader::SyncReader;
    use dsetio_core::backend::{DatasetStorage, StorageBackend};
    use dsetio_core::options::ReadOptionsBuilder;
    use mockall::mock;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};
    use test_case::test_case;

    const ROWS: usize = 25;
    const COLS: usize = 3;

    fn grid() -> Vec<f64> {
        (0..ROWS * COLS).map(|v| v as f64).collect()
    }

    fn grid_shape() -> Shape {
        Shape::new(vec![ROWS, COLS])
    }

    mock! {
        Storage {}

        impl DatasetStorage for Storage {
            fn shape(&self) -> Shape;
            fn element_type(&self) -> ElementType;
            fn read_full(&mut self) -> Result<Buffer>;
            fn read_hyperslab(&mut self, slab: &Hyperslab) -> Result<Buffer>;
            fn close(&mut self) -> Result<()>;
        }
    }

    /// Backend handing out one prepared mock
    struct OneShot(Mutex<Option<MockStorage>>);

    impl StorageBackend for OneShot {
        fn open_dataset(&self, _path: &str, _options: &ReadOptions) -> Result<Box<dyn DatasetStorage>> {
            let storage = self.0.lock().unwrap().take().ok_or_else(|| Error::Backend("opened twice".into()))?;
            Ok(Box::new(storage))
        }
    }

    /// Mock serving the grid that counts hyperslab reads
    fn counting_storage(fetches: Arc<Mutex<Vec<Hyperslab>>>) -> MockStorage {
        let mut storage = MockStorage::new();
        storage.expect_shape().return_const(grid_shape());
        storage.expect_element_type().return_const(ElementType::Float64);
        storage
            .expect_read_full()
            .returning(|| Ok(Buffer::Float64(grid())));
        storage.expect_read_hyperslab().returning(move |slab| {
            fetches.lock().unwrap().push(*slab);
            slice::extract(&Buffer::Float64(grid()), &grid_shape(), slab, &StrColumns::default())
        });
        storage.expect_close().returning(|| Ok(()));
        storage
    }

    fn handle(storage: MockStorage, options: ReadOptions) -> DatasetHandle {
        let backend = OneShot(Mutex::new(Some(storage)));
        let reader = SyncReader::open(&backend, "/grid", options).unwrap();
        DatasetHandle::new(Box::new(reader)).unwrap()
    }

    fn row_options(window: usize) -> ReadOptions {
        ReadOptions::builder(ElementType::Float64)
            .incremental(Axis::Row, window)
            .build()
            .unwrap()
    }

    fn column_options(window: usize) -> ReadOptions {
        ReadOptions::builder(ElementType::Float64)
            .incremental(Axis::Column, window)
            .build()
            .unwrap()
    }

    fn expected_row(i: usize) -> Vec<f64> {
        grid()[i * COLS..(i + 1) * COLS].to_vec()
    }

    fn expected_column(j: usize) -> Vec<f64> {
        (0..ROWS).map(|r| (r * COLS + j) as f64).collect()
    }

    #[test]
    fn test_first_access_fetches_and_repeats_are_free() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(10));
        assert_eq!(h.window(), None);

        assert_eq!(h.read_row::<f64>(3).unwrap(), expected_row(3));
        assert_eq!(h.window(), Some(IndexRange::new(3, 12)));
        for i in [3, 4, 12, 7, 3] {
            assert_eq!(h.read_row::<f64>(i).unwrap(), expected_row(i));
        }
        assert_eq!(fetches.lock().unwrap().len(), 1);
        assert_eq!(h.dims().dims(), &[10, COLS]);
    }

    #[test_case(10, 24 => (24, 24); "single trailing row")]
    #[test_case(10, 20 => (20, 24); "partial final window")]
    #[test_case(5, 20 => (20, 24); "exact multiple")]
    #[test_case(30, 0 => (0, 24); "window larger than extent")]
    fn test_boundary_window(window: usize, index: usize) -> (usize, usize) {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(window));
        assert_eq!(h.read_row::<f64>(index).unwrap(), expected_row(index));
        let slab = fetches.lock().unwrap()[0];
        assert_eq!(h.dims().rows(), slab.rows.len());
        (slab.rows.start, slab.rows.end)
    }

    #[test]
    fn test_column_window() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), column_options(2));

        assert_eq!(h.read_column::<f64>(1).unwrap(), expected_column(1));
        assert_eq!(h.window(), Some(IndexRange::new(1, 2)));
        h.read_column::<f64>(2).unwrap();
        h.read_column::<f64>(0).unwrap();
        assert_eq!(fetches.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_axis_is_rejected() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(4));
        let err = h.read_column::<f64>(0).unwrap_err();
        assert!(matches!(
            err,
            Error::AxisMismatch {
                configured: Axis::Row,
                requested: Axis::Column
            }
        ));
        assert!(fetches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_index_past_extent() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(4));
        assert!(matches!(h.read_row::<f64>(ROWS), Err(Error::InvalidRange { .. })));
        assert!(fetches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_inverted_range_leaves_state_unchanged() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(4));
        h.read_row::<f64>(8).unwrap();
        let before = (h.buffer().clone(), h.dims().clone(), h.window());

        let inverted = Hyperslab::new(IndexRange::new(5, 2), IndexRange::new(0, 2));
        assert!(matches!(h.read_subset(&inverted), Err(Error::InvalidRange { .. })));
        assert_eq!((h.buffer().clone(), h.dims().clone(), h.window()), before);
        assert_eq!(fetches.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_backend_failure_leaves_state_unchanged() {
        let mut storage = MockStorage::new();
        storage.expect_shape().return_const(grid_shape());
        storage.expect_element_type().return_const(ElementType::Float64);
        let mut calls = 0;
        storage.expect_read_hyperslab().returning(move |slab| {
            calls += 1;
            if calls == 1 {
                slice::extract(&Buffer::Float64(grid()), &grid_shape(), slab, &StrColumns::default())
            } else {
                Err(Error::Backend("disk unplugged".into()))
            }
        });

        let mut h = handle(storage, row_options(5));
        h.read_row::<f64>(0).unwrap();
        let err = h.read_row::<f64>(7).unwrap_err();
        assert!(matches!(err, Error::Backend(msg) if msg == "disk unplugged"));
        assert_eq!(h.window(), Some(IndexRange::new(0, 4)));
        assert_eq!(h.read_row::<f64>(2).unwrap(), expected_row(2));
    }

    #[test]
    fn test_full_read_serves_incremental_rows() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(4));
        h.read().unwrap();
        assert_eq!(h.window(), Some(IndexRange::new(0, ROWS - 1)));
        assert_eq!(h.read_row::<f64>(20).unwrap(), expected_row(20));
        assert!(fetches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_direct_access_loads_once() {
        let mut storage = MockStorage::new();
        storage.expect_shape().return_const(grid_shape());
        storage.expect_element_type().return_const(ElementType::Float64);
        storage
            .expect_read_full()
            .times(1)
            .returning(|| Ok(Buffer::Float64(grid())));

        let mut h = handle(storage, ReadOptions::new(ElementType::Float64));
        assert_eq!(h.read_row::<f64>(4).unwrap(), expected_row(4));
        let column: Vec<f64> = (0..ROWS).map(|r| (r * COLS + 2) as f64).collect();
        assert_eq!(h.read_column::<f64>(2).unwrap(), column);
        assert_eq!(h.dims(), h.dimensions());
    }

    #[test]
    fn test_element_type_is_checked_before_fetching() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(4));
        assert!(matches!(h.read_row::<i32>(0), Err(Error::TypeMismatch(_))));
        assert!(fetches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let mut h = handle(counting_storage(fetches), row_options(4));
        h.read_row::<f64>(0).unwrap();
        h.close().unwrap();
        h.close().unwrap();
        assert!(h.buffer().is_empty());
        assert!(h.read_row::<f64>(0).is_err());
    }

    fn string_handle(options: ReadOptions) -> DatasetHandle {
        let store = MemoryStorage::new();
        let rows: &[&[u8]] = &[b"gauge-01\0\0  ok\0\0", b"gauge-02\0\0fail\0\0", b"gauge-03\0\0  ok\0\0"];
        store
            .insert("/names", Shape::new(vec![3, 2]), Buffer::Bytes(rows.concat()))
            .unwrap();
        let reader = SyncReader::open(&store, "/names", options).unwrap();
        DatasetHandle::new(Box::new(reader)).unwrap()
    }

    fn string_options() -> ReadOptionsBuilder {
        ReadOptions::builder(ElementType::FixedString).str_columns(StrColumns::new(vec![10, 6]))
    }

    #[test]
    fn test_string_rows_and_columns() {
        let mut h = string_handle(string_options().incremental(Axis::Row, 2).build().unwrap());
        assert_eq!(h.read_string_row(1).unwrap(), vec!["gauge-02", "fail"]);
        assert_eq!(h.read_string_row(2).unwrap(), vec!["gauge-03", "ok"]);

        let mut h = string_handle(string_options().incremental(Axis::Column, 1).build().unwrap());
        assert_eq!(h.read_string_column(1).unwrap(), vec!["ok", "fail", "ok"]);
        assert_eq!(h.dims().dims(), &[3, 1]);
        assert_eq!(h.buffer().len(), 18);
        assert_eq!(h.window(), Some(IndexRange::new(1, 1)));
        assert_eq!(h.read_string_column(0).unwrap(), vec!["gauge-01", "gauge-02", "gauge-03"]);
        assert_eq!(h.buffer().len(), 30);
    }

    #[test]
    fn test_string_subset_of_one_column() {
        let mut h = string_handle(string_options().build().unwrap());
        let slab = Hyperslab::new(IndexRange::new(1, 2), IndexRange::new(1, 1));
        assert_eq!(h.read_subset(&slab).unwrap(), &Buffer::Bytes(b"fail\0\0  ok\0\0".to_vec()));
        assert_eq!(h.dims().dims(), &[2, 1]);
    }

    #[test]
    fn test_string_columns_must_match_dataset() {
        let store = MemoryStorage::new();
        store
            .insert("/names", Shape::new(vec![1, 2]), Buffer::Bytes(b"abcdef".to_vec()))
            .unwrap();
        let options = ReadOptions::builder(ElementType::FixedString)
            .str_columns(StrColumns::new(vec![6]))
            .build()
            .unwrap();
        let reader = SyncReader::open(&store, "/names", options).unwrap();
        assert!(matches!(
            DatasetHandle::new(Box::new(reader)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_read_on_create() {
        let fetches = Arc::new(Mutex::new(Vec::new()));
        let options = ReadOptions::builder(ElementType::Float64)
            .read_on_create(true)
            .build()
            .unwrap();
        let h = handle(counting_storage(fetches), options);
        assert_eq!(h.buffer().len(), ROWS * COLS);
        assert_eq!(h.window(), Some(IndexRange::new(0, ROWS - 1)));
    }

    proptest! {
        #[test]
        fn prop_windowed_rows_match_full_read(
            window in 1usize..12,
            indices in prop::collection::vec(0usize..ROWS, 1..40),
        ) {
            let fetches = Arc::new(Mutex::new(Vec::new()));
            let mut h = handle(counting_storage(Arc::clone(&fetches)), row_options(window));

            let mut resident: Option<IndexRange> = None;
            let mut expected_fetches = 0;
            for &i in &indices {
                if !resident.is_some_and(|w| w.contains(i)) {
                    expected_fetches += 1;
                    resident = Some(IndexRange::window(i, window, ROWS));
                }
                prop_assert_eq!(h.read_row::<f64>(i).unwrap(), expected_row(i));
                prop_assert_eq!(h.window(), resident);
            }
            prop_assert_eq!(fetches.lock().unwrap().len(), expected_fetches);
            for slab in fetches.lock().unwrap().iter() {
                prop_assert!(slab.rows.end < ROWS);
                prop_assert_eq!(slab.rows.len(), window.min(ROWS - slab.rows.start));
            }
        }
    }

    proptest! {
        #[test]
        fn prop_windowed_columns_match_full_read(
            window in 1usize..=COLS,
            indices in prop::collection::vec(0usize..COLS, 1..20),
        ) {
            let fetches = Arc::new(Mutex::new(Vec::new()));
            let mut h = handle(counting_storage(Arc::clone(&fetches)), column_options(window));

            let mut resident: Option<IndexRange> = None;
            let mut expected_fetches = 0;
            for &j in &indices {
                if !resident.is_some_and(|w| w.contains(j)) {
                    expected_fetches += 1;
                    resident = Some(IndexRange::window(j, window, COLS));
                }
                prop_assert_eq!(h.read_column::<f64>(j).unwrap(), expected_column(j));
                prop_assert_eq!(h.window(), resident);
            }
            prop_assert_eq!(fetches.lock().unwrap().len(), expected_fetches);
            for slab in fetches.lock().unwrap().iter() {
                prop_assert!(slab.rows.covers(ROWS));
                prop_assert_eq!(slab.cols.len(), window.min(COLS - slab.cols.start));
            }
        }
    }
}
