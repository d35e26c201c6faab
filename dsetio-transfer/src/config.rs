//! Transfer configuration
//!
//! A [`TransferConfig`] is passed explicitly to every transfer. A process-wide
//! default may be installed once with [`TransferConfig::install`]; it cannot be
//! replaced afterwards.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dsetio_core::error::{Error, Result};

/// Environment variable holding the worker executable path
pub const WORKER_VAR: &str = "HDFDUTILCMD";

/// Environment variable overriding the pipe root directory
pub const PIPE_ROOT_VAR: &str = "DSETIO_PIPE_ROOT";

/// Variables forwarded from the caller's environment to the worker
pub const DEFAULT_PASSTHROUGH: &[&str] = &[
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "LD_LIBRARY_PATH",
    "RUST_LOG",
];

static GLOBAL: OnceLock<Arc<TransferConfig>> = OnceLock::new();

/// Where the worker lives, where pipes are created, and what the worker inherits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    worker: PathBuf,
    pipe_root: PathBuf,
    passthrough: Vec<String>,
}

impl TransferConfig {
    /// Configuration for the given worker executable with the default pipe root
    pub fn new(worker: impl Into<PathBuf>) -> Self {
        Self {
            worker: worker.into(),
            pipe_root: default_pipe_root(),
            passthrough: DEFAULT_PASSTHROUGH.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Create pipes under `root` instead of the default
    pub fn with_pipe_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.pipe_root = root.into();
        self
    }

    /// Replace the list of forwarded environment variables
    pub fn with_passthrough<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let worker = lookup(WORKER_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "{WORKER_VAR} must name the dataset worker executable"
                ))
            })?;

        let mut config = Self::new(worker);
        if let Some(root) = lookup(PIPE_ROOT_VAR).filter(|v| !v.trim().is_empty()) {
            config.pipe_root = PathBuf::from(root);
        }
        Ok(config)
    }

    /// Check the preconditions of spawning a worker
    pub fn validate(&self) -> Result<()> {
        if self.worker.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "no dataset worker executable configured".into(),
            ));
        }
        Ok(())
    }

    /// Install this configuration as the process-wide default
    pub fn install(self) -> Result<Arc<Self>> {
        self.validate()?;
        let config = Arc::new(self);
        GLOBAL
            .set(Arc::clone(&config))
            .map_err(|_| Error::Configuration("transfer configuration is already installed".into()))?;
        Ok(config)
    }

    /// The process-wide default installed with [`TransferConfig::install`]
    pub fn global() -> Result<Arc<Self>> {
        GLOBAL.get().cloned().ok_or_else(|| {
            Error::Configuration("no transfer configuration has been installed".into())
        })
    }

    /// Worker executable
    pub fn worker(&self) -> &Path {
        &self.worker
    }

    /// Directory pipes are created in
    pub fn pipe_root(&self) -> &Path {
        &self.pipe_root
    }

    /// Names of the variables forwarded to the worker
    pub fn passthrough(&self) -> &[String] {
        &self.passthrough
    }
}

fn default_pipe_root() -> PathBuf {
    env::temp_dir().join("dsetio-pipes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_worker_is_a_configuration_error() {
        let err = TransferConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains(WORKER_VAR)));

        let err = TransferConfig::from_lookup(lookup(&[(WORKER_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_from_lookup() {
        let config = TransferConfig::from_lookup(lookup(&[
            (WORKER_VAR, "/opt/bin/dsetio-worker"),
            (PIPE_ROOT_VAR, "/run/pipes"),
        ]))
        .unwrap();
        assert_eq!(config.worker(), Path::new("/opt/bin/dsetio-worker"));
        assert_eq!(config.pipe_root(), Path::new("/run/pipes"));
        assert!(config.passthrough().iter().any(|v| v == "AWS_REGION"));
    }

    #[test]
    fn test_default_pipe_root() {
        let config = TransferConfig::new("worker");
        assert!(config.pipe_root().ends_with("dsetio-pipes"));
    }

    #[test]
    fn test_empty_worker_fails_validation() {
        assert!(TransferConfig::new("").validate().is_err());
        assert!(TransferConfig::new("").install().is_err());
    }
}
