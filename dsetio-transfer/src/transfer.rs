//! One out-of-process read: pipe, worker, framed stream, cleanup
//!
//! The caller opens the read end of the pipe before the worker starts and
//! keeps a write end of its own open until the worker has exited. Neither
//! side ever blocks in `open`, the read end never sees a spurious end of
//! stream while the worker is still connecting, and once the worker is gone
//! dropping the caller's write end turns the remaining buffered bytes into a
//! clean end of stream.
//!
//! Whatever happens, the worker is waited on and the pipe file is removed.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use dsetio_core::buffer::DatasetData;
use dsetio_core::error::{Error, Result};
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cancel::{cancel_pair, CancelToken, Canceller};
use crate::codec;
use crate::config::TransferConfig;
use crate::descriptor::{TransferDescriptor, TransferRequest};
use crate::pipe::NamedPipe;

const READ_CHUNK: usize = 64 * 1024;

/// Run one transfer to completion
pub async fn run(
    config: &TransferConfig,
    request: TransferRequest,
    mut cancel: CancelToken,
) -> Result<DatasetData> {
    config.validate()?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let pipe = NamedPipe::create(config.pipe_root())?;
    let descriptor = TransferDescriptor::new(request, pipe.path())?;
    let mut receiver = pipe::OpenOptions::new().open_receiver(pipe.path())?;
    let keepalive = pipe::OpenOptions::new().open_sender(pipe.path())?;

    let mut child = spawn_worker(config, &descriptor)?;
    info!(
        kind = %descriptor.request().kind,
        dataset = %descriptor.request().dataset,
        pipe = %pipe.path().display(),
        "started transfer"
    );

    let mut keepalive = Some(keepalive);
    let mut received = Vec::with_capacity(READ_CHUNK);
    let mut status: Option<ExitStatus> = None;
    let mut interrupted: Option<Error> = None;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                interrupted = Some(Error::Cancelled);
                break;
            }

            exit = child.wait(), if status.is_none() => match exit {
                Ok(exit) => {
                    debug!(status = %exit, "worker exited");
                    status = Some(exit);
                    drop(keepalive.take());
                }
                Err(e) => {
                    interrupted = Some(e.into());
                    break;
                }
            },

            read = receiver.read_buf(&mut received) => match read {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(e) = codec::check_progress(&received) {
                        interrupted = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    interrupted = Some(e.into());
                    break;
                }
            },
        }
    }

    drop(keepalive);
    drop(receiver);
    let status = finish_worker(&mut child, status, interrupted.is_some()).await;
    drop(pipe);

    let outcome = settle(status, interrupted, &received);
    match &outcome {
        Ok(data) => info!(dims = %data.dims, bytes = received.len(), "finished transfer"),
        Err(e) => warn!(error = %e, "transfer failed"),
    }
    outcome
}

/// Kill the worker if the stream was abandoned, then always reap it
async fn finish_worker(
    child: &mut Child,
    status: Option<ExitStatus>,
    abandon: bool,
) -> io::Result<ExitStatus> {
    if let Some(status) = status {
        return Ok(status);
    }
    if abandon {
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "worker already gone");
        }
    }
    child.wait().await
}

fn settle(
    status: io::Result<ExitStatus>,
    interrupted: Option<Error>,
    received: &[u8],
) -> Result<DatasetData> {
    if let Some(err) = interrupted {
        return Err(err);
    }
    let status = status?;
    let decoded = codec::decode(received);
    if !status.success() {
        let detail = match decoded {
            Ok(_) => "a complete frame was received".to_string(),
            Err(e) => e.to_string(),
        };
        return Err(Error::WorkerFailed { status, detail });
    }
    decoded
}

fn spawn_worker(config: &TransferConfig, descriptor: &TransferDescriptor) -> Result<Child> {
    let inherited = config
        .passthrough()
        .iter()
        .filter_map(|name| std::env::var_os(name).map(|value| (name.as_str(), value)));

    let mut command = Command::new(config.worker());
    command
        .arg(descriptor.request().kind.as_arg())
        .env_clear()
        .envs(inherited)
        .envs(descriptor.env_pairs())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    command.spawn().map_err(|e| {
        Error::Configuration(format!(
            "cannot start worker {}: {e}",
            config.worker().display()
        ))
    })
}

/// A transfer running on the tokio runtime
#[derive(Debug)]
pub struct TransferHandle {
    task: JoinHandle<Result<DatasetData>>,
    canceller: Canceller,
}

impl TransferHandle {
    /// Ask the transfer to stop; it still reaps the worker and removes the pipe
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Wait for the transfer's result
    pub async fn join(self) -> Result<DatasetData> {
        join_task(self.task).await
    }
}

/// Start a transfer in the background; must be called within a tokio runtime
pub fn spawn(config: Arc<TransferConfig>, request: TransferRequest) -> TransferHandle {
    let (canceller, token) = cancel_pair();
    TransferHandle {
        task: spawn_with(config, request, token),
        canceller,
    }
}

pub(crate) fn spawn_with(
    config: Arc<TransferConfig>,
    request: TransferRequest,
    token: CancelToken,
) -> JoinHandle<Result<DatasetData>> {
    tokio::spawn(async move { run(&config, request, token).await })
}

pub(crate) async fn join_task(task: JoinHandle<Result<DatasetData>>) -> Result<DatasetData> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(Error::Cancelled),
        Err(e) => Err(Error::Io(io::Error::other(e))),
    }
}
