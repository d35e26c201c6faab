//! Transfer requests and the worker invocation they turn into

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dsetio_core::error::{Error, Result};
use dsetio_core::schema::{ElementType, StrColumns};
use dsetio_core::selection::Hyperslab;
use serde::{Deserialize, Serialize};

/// Pipe the worker writes its result to
pub const PIPE_VAR: &str = "NAMEDPIPE";
/// Store the worker reads from
pub const FILE_VAR: &str = "FILEPATH";
/// Dataset path inside the store
pub const DATASET_VAR: &str = "DATAPATH";
/// Comma-joined string column widths
pub const STR_SIZES_VAR: &str = "HDFOPTSTRSIZES";
/// Element type selector code
pub const TYPE_VAR: &str = "HDFOPTTYPE";
/// `row-start,row-end,col-start,col-end`, empty for a full read
pub const SUBSET_VAR: &str = "HDFSUBSET";
/// `true` when only the dimensions are wanted
pub const DIMS_ONLY_VAR: &str = "HDFDIMSONLY";

/// Operation the worker performs, passed as its only positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// Dataset read
    Dataset,
    /// Attribute read (the worker does not implement it)
    Attribute,
}

impl TransferKind {
    /// Argument form
    pub fn as_arg(self) -> &'static str {
        match self {
            TransferKind::Dataset => "DSET",
            TransferKind::Attribute => "ATTR",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl FromStr for TransferKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DSET" => Ok(TransferKind::Dataset),
            "ATTR" => Ok(TransferKind::Attribute),
            other => Err(Error::InvalidArgument(format!("unknown transfer kind {other:?}"))),
        }
    }
}

/// What a caller wants read out of process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Operation kind
    pub kind: TransferKind,
    /// Source store path
    pub file: PathBuf,
    /// Dataset path inside the store
    pub dataset: String,
    /// Requested element type
    pub element: ElementType,
    /// String column widths, empty for numeric datasets
    pub str_columns: StrColumns,
    /// Optional subset, `None` for the whole dataset
    pub subset: Option<Hyperslab>,
    /// Report dimensions only, with an empty buffer
    pub dims_only: bool,
}

impl TransferRequest {
    /// Full read of `dataset` in `file`
    pub fn dataset(file: impl Into<PathBuf>, dataset: impl Into<String>, element: ElementType) -> Self {
        Self {
            kind: TransferKind::Dataset,
            file: file.into(),
            dataset: dataset.into(),
            element,
            str_columns: StrColumns::default(),
            subset: None,
            dims_only: false,
        }
    }

    /// Set the string column widths
    pub fn with_str_columns(mut self, columns: StrColumns) -> Self {
        self.str_columns = columns;
        self
    }

    /// Restrict the read to `subset`
    pub fn with_subset(mut self, subset: Hyperslab) -> Self {
        self.subset = Some(subset);
        self
    }

    /// Ask only for the dimensions
    pub fn dims_only(mut self) -> Self {
        self.dims_only = true;
        self
    }
}

/// One in-flight worker invocation: the request bound to its pipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    request: TransferRequest,
    file: PathBuf,
    pipe: PathBuf,
}

impl TransferDescriptor {
    /// Bind `request` to `pipe`, resolving the source path to an absolute one
    pub fn new(request: TransferRequest, pipe: &Path) -> Result<Self> {
        let file = if request.file.is_absolute() {
            request.file.clone()
        } else {
            std::env::current_dir()?.join(&request.file)
        };
        Ok(Self {
            request,
            file,
            pipe: pipe.to_path_buf(),
        })
    }

    /// The request
    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    /// Pipe path
    pub fn pipe(&self) -> &Path {
        &self.pipe
    }

    /// Environment the worker receives on top of the pass-through variables
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        let subset = self
            .request
            .subset
            .map(|s| s.to_string())
            .unwrap_or_default();
        vec![
            (PIPE_VAR, self.pipe.display().to_string()),
            (FILE_VAR, self.file.display().to_string()),
            (DATASET_VAR, self.request.dataset.clone()),
            (STR_SIZES_VAR, self.request.str_columns.to_string()),
            (TYPE_VAR, self.request.element.code().to_string()),
            (SUBSET_VAR, subset),
            (DIMS_ONLY_VAR, self.request.dims_only.to_string()),
        ]
    }
}
