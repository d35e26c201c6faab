//! Named pipes allocated per transfer

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use dsetio_core::error::{Error, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// A FIFO under the pipe root, removed when dropped
#[derive(Debug)]
pub struct NamedPipe {
    path: PathBuf,
}

impl NamedPipe {
    /// Create a uniquely named pipe under `root`, creating `root` if needed
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|source| Error::PipeCreation {
            path: root.to_path_buf(),
            source,
        })?;

        let path = root.join(format!("{}.pipe", Uuid::new_v4()));
        mkfifo(&path).map_err(|source| Error::PipeCreation {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "created pipe");
        Ok(Self { path })
    }

    /// Filesystem path of the pipe
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamedPipe {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed pipe"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove pipe"),
        }
    }
}

fn mkfifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
