//! Build error taxonomy.
//!
//! Every error here is recoverable at the coordinator: the last good cache keeps
//! being served. Configuration errors reset the cache to empty, transient errors
//! are retried on the next poll, parse errors abort the pass.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::reader::{OpenError, OpenErrorKind};

#[derive(Debug)]
pub enum BuildError {
    /// No source directory configured.
    NotConfigured,
    /// The source directory is missing or holds no marker bank.
    NoBanks { dir: PathBuf },
    /// The marker is still being written by the authoring tool.
    Unstable { path: PathBuf, attempts: u32 },
    /// A bank could not be opened because another process holds it.
    Locked { path: PathBuf },
    /// A bank is corrupt or unreadable.
    Parse { path: PathBuf, reason: String },
    /// Filesystem metadata could not be read mid-pass.
    Io { path: PathBuf, source: io::Error },
}

impl BuildError {
    /// Retried automatically on the next poll cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BuildError::Unstable { .. } | BuildError::Locked { .. } | BuildError::Io { .. }
        )
    }

    /// Resets the cache to empty.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BuildError::NotConfigured | BuildError::NoBanks { .. })
    }

    /// Whether a human should see this. Transient errors only surface once
    /// the retry budget has been spent.
    pub fn is_user_visible(&self, budget_exhausted: bool) -> bool {
        match self {
            BuildError::Parse { .. } => true,
            e if e.is_retryable() => budget_exhausted,
            _ => false,
        }
    }

    pub(crate) fn from_open(path: PathBuf, err: OpenError) -> Self {
        match err.kind {
            OpenErrorKind::Locked => BuildError::Locked { path },
            _ => BuildError::Parse {
                path,
                reason: err.to_string(),
            },
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::NotConfigured => write!(f, "source bank directory is not configured"),
            BuildError::NoBanks { dir } => write!(
                f,
                "directory {} doesn't contain any banks; build the banks or check the source path",
                dir.display()
            ),
            BuildError::Unstable { path, attempts } => write!(
                f,
                "{} is still being written (checked {} times)",
                path.display(),
                attempts
            ),
            BuildError::Locked { path } => {
                write!(f, "{} is locked by another process", path.display())
            }
            BuildError::Parse { path, reason } => {
                write!(f, "unable to load {}: {}", path.display(), reason)
            }
            BuildError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
