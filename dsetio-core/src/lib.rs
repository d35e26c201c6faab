//! Core types for windowed access to large array datasets
//!
//! This crate holds the pieces shared by the readers, the transfer protocol
//! and the worker: the error taxonomy, dataset shapes and selections, typed
//! buffers, the little-endian byte decoder, the schema-driven record layout
//! decoder, and the storage backend traits every reader is built on.

#![warn(missing_docs)]

pub mod backend;
pub mod buffer;
pub mod bytes;
pub mod error;
pub mod io;
pub mod layout;
pub mod options;
pub mod schema;
pub mod selection;

pub use backend::{CompoundStorage, DatasetStorage, StorageBackend};
pub use buffer::{Buffer, DatasetData, Element};
pub use error::{Error, Result};
pub use layout::{FieldDescriptor, FieldKind, FromRecord, Record, RecordLayout, RecordSchema, Value};
pub use options::{Incremental, ReadOptions, ReadOptionsBuilder};
pub use schema::{ElementType, Shape, StrColumns};
pub use selection::{Axis, Hyperslab, IndexRange};
