//! Concurrent transfers joined as one

use std::sync::Arc;

use dsetio_core::buffer::DatasetData;
use dsetio_core::error::Result;
use futures::future::join_all;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::TransferConfig;
use crate::descriptor::TransferRequest;
use crate::transfer::{join_task, spawn_with};

/// A set of independent transfers launched together
///
/// Each transfer gets its own pipe and worker; the batch resolves once every
/// pipe has been drained and every worker reaped.
#[derive(Debug)]
pub struct TransferBatch {
    config: Arc<TransferConfig>,
    requests: Vec<TransferRequest>,
}

impl TransferBatch {
    /// Empty batch using `config`
    pub fn new(config: Arc<TransferConfig>) -> Self {
        Self {
            config,
            requests: Vec::new(),
        }
    }

    /// Add a transfer
    pub fn push(&mut self, request: TransferRequest) {
        self.requests.push(request);
    }

    /// Number of transfers
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Run every transfer and return their results in request order
    pub async fn run(self) -> Vec<Result<DatasetData>> {
        self.run_until(CancelToken::never()).await
    }

    /// Like [`TransferBatch::run`], cancelling every transfer when `cancel` fires
    pub async fn run_until(self, cancel: CancelToken) -> Vec<Result<DatasetData>> {
        debug!(transfers = self.requests.len(), "launching transfer batch");
        let tasks: Vec<_> = self
            .requests
            .into_iter()
            .map(|request| spawn_with(Arc::clone(&self.config), request, cancel.clone()))
            .collect();
        join_all(tasks.into_iter().map(join_task)).await
    }

    /// Run every transfer, failing with the first error in request order
    pub async fn run_all(self) -> Result<Vec<DatasetData>> {
        self.run().await.into_iter().collect()
    }
}

impl Extend<TransferRequest> for TransferBatch {
    fn extend<I: IntoIterator<Item = TransferRequest>>(&mut self, iter: I) {
        self.requests.extend(iter);
    }
}
