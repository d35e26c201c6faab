//! Dataset readers with incremental-window access
//!
//! A [`DatasetHandle`] wraps either reader implementation:
//!
//! - [`SyncReader`] calls a [`StorageBackend`](dsetio_core::StorageBackend) in
//!   the current process
//! - [`AsyncReader`] runs every read in a worker process and streams the
//!   result back over a named pipe
//!
//! Both obey the same [`DatasetReader`] contract, so the windowing rules of
//! the handle are identical whichever one is active. [`ReaderSource`] picks
//! between them.

#![warn(missing_docs)]

pub mod async_reader;
pub mod compound;
pub mod dataset;
pub mod factory;
pub mod memory;
pub mod raw;
pub mod reader;
pub mod slice;

pub use async_reader::AsyncReader;
pub use compound::{read_compound, read_records};
pub use dataset::DatasetHandle;
pub use factory::ReaderSource;
pub use memory::MemoryStorage;
pub use raw::DirStore;
pub use reader::{DatasetReader, SyncReader};
