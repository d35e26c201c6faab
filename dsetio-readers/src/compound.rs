//! Reads of packed compound-record datasets

use dsetio_core::backend::{CompoundStorage, StorageBackend};
use dsetio_core::error::Result;
use dsetio_core::layout::{FromRecord, Record, RecordLayout, RecordSchema};
use tracing::debug;

/// Decode every record of `storage` against `schema`
///
/// The layout is built from the stored member names before any record bytes
/// are read, so a schema mismatch never leaves work half done.
pub fn read_records(storage: &mut dyn CompoundStorage, schema: &RecordSchema) -> Result<Vec<Record>> {
    let members = storage.member_names()?;
    let layout = RecordLayout::build(members.as_slice(), schema)?;
    let count = storage.record_count();
    let packed = storage.read_packed()?;
    debug!(count, stride = layout.stride(), "decoding compound records");
    layout.decode_all(&packed, count)
}

/// Read the compound dataset at `path` as values of `T`
pub fn read_compound<T: FromRecord>(backend: &dyn StorageBackend, path: &str) -> Result<Vec<T>> {
    let mut storage = backend.open_compound(path)?;
    read_records(storage.as_mut(), &T::schema())?
        .iter()
        .map(T::from_record)
        .collect()
}
