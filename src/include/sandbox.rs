//! Filesystem include resolver confined to a root directory

use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;
use tracing::{trace, warn};

use super::{normalize_relative, IncludeResolver, Resolved, SandboxError};

/// Opens and reads a checked include, returning at most `limit + 1` bytes
type ReadFn = fn(&Path, &Metadata, u64) -> io::Result<Vec<u8>>;

/// Resolves includes below a canonical sandbox root.
///
/// A path is accepted only if its canonical form (symlinks resolved) lies
/// inside the root. The check happens before the file is opened, and the
/// opened file must be the same one that was checked.
#[derive(Clone)]
pub struct FsSandbox {
    root: PathBuf,
    max_bytes: u64,
    timeout: Duration,
    reader: ReadFn,
}

impl FsSandbox {
    pub fn new(root: impl AsRef<Path>, max_bytes: u64, timeout: Duration) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "sandbox root is not a directory",
            ));
        }
        Ok(Self {
            root,
            max_bytes,
            timeout,
            reader: read_checked,
        })
    }

    #[cfg(test)]
    fn with_reader(mut self, reader: ReadFn) -> Self {
        self.reader = reader;
        self
    }

    /// Canonical sandbox root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read at most `max_bytes + 1` bytes on a worker thread, giving up after the timeout
    fn read_bounded(
        &self,
        file: &Path,
        checked: &Metadata,
        path: &str,
    ) -> Result<Vec<u8>, SandboxError> {
        let (tx, rx) = mpsc::channel();
        let file = file.to_path_buf();
        let checked = checked.clone();
        let limit = self.max_bytes;
        let reader = self.reader;

        std::thread::spawn(move || {
            // The receiver is gone if the read timed out
            let _ = tx.send(reader(&file, &checked, limit));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(buf)) if buf.len() as u64 > limit => Err(SandboxError::TooLarge {
                path: path.to_string(),
                limit,
            }),
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(err)) if is_swapped(&err) => {
                warn!(path, "include changed between check and open");
                Err(SandboxError::Escape {
                    path: path.to_string(),
                })
            }
            Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => Err(SandboxError::Unreadable {
                path: path.to_string(),
            }),
            Err(RecvTimeoutError::Timeout) => {
                warn!(path, timeout_ms = self.timeout.as_millis() as u64, "include read timed out");
                Err(SandboxError::Timeout {
                    path: path.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for FsSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsSandbox")
            .field("root", &self.root)
            .field("max_bytes", &self.max_bytes)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IncludeResolver for FsSandbox {
    fn resolve(&self, path: &str) -> Result<Resolved, SandboxError> {
        let relative = normalize_relative(path).inspect_err(|err| {
            if matches!(err, SandboxError::Escape { .. }) {
                warn!(path, "include path climbs above the sandbox root");
            }
        })?;

        let not_found = || SandboxError::NotFound {
            path: path.to_string(),
        };
        let canonical = self.root.join(&relative).canonicalize().map_err(|_| not_found())?;

        let key = match canonical.strip_prefix(&self.root) {
            Ok(inside) => inside.to_string_lossy().replace('\\', "/"),
            Err(_) => {
                warn!(path, "include resolves outside the sandbox root");
                return Err(SandboxError::Escape {
                    path: path.to_string(),
                });
            }
        };

        let metadata = fs::metadata(&canonical).map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(SandboxError::NotAFile {
                path: path.to_string(),
            });
        }
        if metadata.len() > self.max_bytes {
            return Err(SandboxError::TooLarge {
                path: path.to_string(),
                limit: self.max_bytes,
            });
        }

        let bytes = self.read_bounded(&canonical, &metadata, path)?;
        let content = String::from_utf8(bytes).map_err(|_| SandboxError::NotUtf8 {
            path: path.to_string(),
        })?;

        trace!(path, key = %key, bytes = content.len(), "include resolved");
        Ok(Resolved { key, content })
    }
}

#[derive(Error, Debug)]
#[error("include was replaced after it was checked")]
struct Swapped;

fn is_swapped(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<Swapped>())
}

fn read_checked(file: &Path, checked: &Metadata, limit: u64) -> io::Result<Vec<u8>> {
    let handle = open_no_follow(file)?;
    if !same_file(&handle.metadata()?, checked) {
        return Err(io::Error::new(io::ErrorKind::Other, Swapped));
    }
    let mut buf = Vec::new();
    handle.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(unix)]
fn open_no_follow(file: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(file)
}

#[cfg(not(unix))]
fn open_no_follow(file: &Path) -> io::Result<File> {
    File::open(file)
}

#[cfg(unix)]
fn same_file(opened: &Metadata, checked: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;

    opened.dev() == checked.dev() && opened.ino() == checked.ino()
}

#[cfg(not(unix))]
fn same_file(opened: &Metadata, checked: &Metadata) -> bool {
    opened.is_file() && opened.len() == checked.len()
}
