//! Out-of-process dataset reads over named pipes
//!
//! A transfer creates a uniquely named pipe, starts the dataset worker with a
//! [`TransferDescriptor`] in its environment, decodes the single framed
//! [`DatasetData`](dsetio_core::DatasetData) the worker writes, reaps the
//! worker and removes the pipe. Transfers are independent of each other and
//! may run concurrently, alone ([`spawn`]) or as a [`TransferBatch`].

#![warn(missing_docs)]

pub mod batch;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod pipe;
pub mod transfer;

pub use batch::TransferBatch;
pub use cancel::{cancel_pair, CancelToken, Canceller};
pub use config::TransferConfig;
pub use descriptor::{TransferDescriptor, TransferKind, TransferRequest};
pub use pipe::NamedPipe;
pub use transfer::{run, spawn, TransferHandle};
