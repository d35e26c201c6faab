//! Worker side of the out-of-process transfer
//!
//! The worker is started with one positional argument naming the operation
//! and receives everything else through its environment. It performs a single
//! read against a [`DirStore`] and writes exactly one frame to the pipe.

#![warn(missing_docs)]

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use dsetio_core::buffer::DatasetData;
use dsetio_core::error::Error;
use dsetio_core::options::ReadOptions;
use dsetio_core::schema::{ElementType, StrColumns};
use dsetio_core::selection::Hyperslab;
use dsetio_readers::{DatasetReader, DirStore, SyncReader};
use dsetio_transfer::codec;
use dsetio_transfer::descriptor::{
    DATASET_VAR, DIMS_ONLY_VAR, FILE_VAR, PIPE_VAR, STR_SIZES_VAR, SUBSET_VAR, TYPE_VAR,
};
use tracing::{debug, info};

/// Operation selected by the positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// Dataset read
    #[value(name = "DSET")]
    Dataset,
    /// Attribute read, not implemented
    #[value(name = "ATTR")]
    Attribute,
}

/// Worker invocation
#[derive(Debug, Parser)]
#[command(name = "dsetio-worker", about = "Serve one dataset read over a named pipe")]
pub struct WorkerArgs {
    /// Operation to perform
    #[arg(value_enum)]
    pub operation: Operation,

    /// Pipe to write the result frame to
    #[arg(long, env = PIPE_VAR)]
    pub pipe: PathBuf,

    /// Store to read from
    #[arg(long, env = FILE_VAR)]
    pub file: PathBuf,

    /// Dataset path inside the store
    #[arg(long, env = DATASET_VAR)]
    pub dataset: String,

    /// Element type selector code
    #[arg(long = "type", env = TYPE_VAR)]
    pub element: u32,

    /// Comma-joined string column widths
    #[arg(long, env = STR_SIZES_VAR, default_value = "")]
    pub str_sizes: String,

    /// `row-start,row-end,col-start,col-end`, empty for a full read
    #[arg(long, env = SUBSET_VAR, default_value = "")]
    pub subset: String,

    /// Report dimensions only
    #[arg(long, env = DIMS_ONLY_VAR, action = ArgAction::Set, default_value_t = false)]
    pub dims_only: bool,
}

impl WorkerArgs {
    /// Read options described by the type code and string widths
    pub fn read_options(&self) -> anyhow::Result<ReadOptions> {
        let element = ElementType::from_code(self.element)?;
        let mut builder = ReadOptions::builder(element);
        if element == ElementType::FixedString {
            builder = builder.str_columns(self.str_sizes.parse::<StrColumns>()?);
        }
        Ok(builder.build()?)
    }

    /// Requested subset, `None` for a full read
    pub fn hyperslab(&self) -> anyhow::Result<Option<Hyperslab>> {
        if self.subset.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.subset.parse()?))
    }
}

/// Perform the read `args` describe and write its frame to the pipe
pub fn run(args: &WorkerArgs) -> anyhow::Result<()> {
    match args.operation {
        Operation::Dataset => {
            let data = read_dataset(args)?;
            write_result(args, &data)
        }
        Operation::Attribute => bail!(Error::NotImplemented("attribute reads".into())),
    }
}

/// Read the dataset without touching the pipe
pub fn read_dataset(args: &WorkerArgs) -> anyhow::Result<DatasetData> {
    let options = args.read_options()?;
    let subset = args.hyperslab()?;
    let store = DirStore::open(&args.file)
        .with_context(|| format!("opening store {}", args.file.display()))?;
    let element = options.element();
    let mut reader = SyncReader::open(&store, &args.dataset, options)
        .with_context(|| format!("opening dataset {}", args.dataset))?;

    let data = if args.dims_only {
        DatasetData::dims_only(reader.shape().clone(), element)
    } else if let Some(slab) = subset {
        reader.read_subset(&slab)?
    } else {
        reader.read()?
    };
    reader.close()?;
    debug!(dataset = %args.dataset, dims = %data.dims, "read dataset");
    Ok(data)
}

fn write_result(args: &WorkerArgs, data: &DatasetData) -> anyhow::Result<()> {
    let mut pipe = OpenOptions::new()
        .write(true)
        .open(&args.pipe)
        .with_context(|| format!("opening pipe {}", args.pipe.display()))?;
    codec::write_frame(&mut pipe, data)?;
    info!(dataset = %args.dataset, pipe = %args.pipe.display(), "wrote result");
    Ok(())
}
