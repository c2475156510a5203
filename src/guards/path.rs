//! Path Confinement
//!
//! Resolves a caller-supplied file name against a fixed root directory.
//! Callers only ever supply a bare file name; directory components are never
//! trusted. The resolved path is compared against the root segment by segment,
//! so a root of `/data` does not admit `/database/x`.
//!
//! Resolution happens once. [`PathConfinementGuard::read`] opens the path that
//! was resolved and does not resolve it again. A rename or symlink swap between
//! the check and the open is not defended against.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ErrorKind;

/// Errors produced by path confinement
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("file name is empty or contains invalid characters")]
    InvalidName,

    #[error("file name must not contain a path separator")]
    ContainsSeparator,

    #[error("resolved path is outside the permitted directory")]
    OutsideRoot,

    #[error("file not found")]
    NotFound,

    #[error("confinement root is not a directory: {0:?}")]
    InvalidRoot(PathBuf),

    #[error("file read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("I/O error while resolving or reading file")]
    Io(#[source] io::Error),
}

impl PathError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PathError::InvalidName => ErrorKind::Validation,
            PathError::ContainsSeparator | PathError::OutsideRoot => ErrorKind::Forbidden,
            PathError::NotFound => ErrorKind::NotFound,
            PathError::ReadTimeout(_) => ErrorKind::Timeout,
            PathError::InvalidRoot(_) | PathError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PathError::InvalidName => "invalid_file_name",
            PathError::ContainsSeparator | PathError::OutsideRoot => "forbidden_path",
            PathError::NotFound => "not_found",
            PathError::ReadTimeout(_) => "read_timeout",
            PathError::InvalidRoot(_) | PathError::Io(_) => "internal_error",
        }
    }
}

/// A canonical path proven to lie inside its root
///
/// Only [`PathConfinementGuard::confine`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    path: PathBuf,
    root: PathBuf,
}

impl CanonicalPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the root
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }
}

/// Confines file lookups to one directory
#[derive(Debug, Clone)]
pub struct PathConfinementGuard {
    root: PathBuf,
}

impl PathConfinementGuard {
    /// Create a guard for `root`, which must be an existing directory
    ///
    /// The root is canonicalized here, once, so later comparisons are between
    /// two canonical paths.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathError> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|_| PathError::InvalidRoot(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(PathError::InvalidRoot(root.to_path_buf()));
        }
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `requested` inside the root
    ///
    /// `Forbidden`-class errors always win over `NotFound`: a name is only
    /// reported missing once it is known that it could not have escaped.
    pub fn confine(&self, requested: &str) -> Result<CanonicalPath, PathError> {
        if requested.is_empty() || requested.contains('\0') {
            return Err(PathError::InvalidName);
        }

        // Both separators, whatever the host OS uses
        if requested.contains('/') || requested.contains('\\') {
            return Err(PathError::ContainsSeparator);
        }

        let joined = self.root.join(requested);

        let canonical = match joined.canonicalize() {
            Ok(path) => path,
            Err(e) => {
                // An entry that exists but cannot be resolved (dangling link,
                // loop, link through a file, unreadable target) cannot be
                // proven confined.
                debug!(error = %e, "confinement target does not resolve");
                return match joined.symlink_metadata() {
                    Ok(_) => Err(PathError::OutsideRoot),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PathError::NotFound),
                    Err(e) => Err(PathError::Io(e)),
                };
            }
        };

        if !is_within(&canonical, &self.root) {
            debug!(root = ?self.root, "resolved path escapes confinement root");
            return Err(PathError::OutsideRoot);
        }

        let metadata = std::fs::metadata(&canonical).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PathError::NotFound,
            _ => PathError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(PathError::NotFound);
        }

        Ok(CanonicalPath {
            path: canonical,
            root: self.root.clone(),
        })
    }

    /// [`confine`](Self::confine) on the blocking pool
    pub async fn resolve(&self, requested: String) -> Result<CanonicalPath, PathError> {
        let guard = self.clone();
        tokio::task::spawn_blocking(move || guard.confine(&requested))
            .await
            .map_err(|e| PathError::Io(io::Error::other(e)))?
    }

    /// Read a confined file under a deadline
    pub async fn read(path: &CanonicalPath, timeout: Duration) -> Result<Vec<u8>, PathError> {
        match tokio::time::timeout(timeout, tokio::fs::read(path.as_path())).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => Err(PathError::NotFound),
            Ok(Err(e)) => Err(PathError::Io(e)),
            Err(_) => Err(PathError::ReadTimeout(timeout)),
        }
    }
}

/// Segment-wise prefix check
///
/// Both paths are canonical, so components compare exactly; `..` can no
/// longer appear.
fn is_within(candidate: &Path, root: &Path) -> bool {
    let mut candidate = candidate.components();
    for root_part in root.components() {
        match candidate.next() {
            Some(part) if part == root_part => {}
            _ => return false,
        }
    }
    !candidate.any(|c| matches!(c, Component::ParentDir))
}
