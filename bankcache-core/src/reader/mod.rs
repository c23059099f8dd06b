//! Bank reader: the opaque open/enumerate/close capability over bank files.
//!
//! The binary bank format is not interpreted here. Implementations translate a
//! file into descriptors; the builder turns descriptors into cache records.

mod manifest;

pub use manifest::ManifestReader;

use std::fmt;
use std::path::Path;

use bankcache_types::{EventDescriptor, Guid, ParameterDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenErrorKind {
    NotFound,
    /// Held open by another process; worth retrying.
    Locked,
    Corrupt,
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenError {
    pub kind: OpenErrorKind,
    pub message: String,
}

impl OpenError {
    pub fn new(kind: OpenErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for OpenError {}

impl From<std::io::Error> for OpenError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match e.kind() {
            ErrorKind::NotFound => OpenErrorKind::NotFound,
            ErrorKind::PermissionDenied | ErrorKind::WouldBlock => OpenErrorKind::Locked,
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => OpenErrorKind::Corrupt,
            _ => OpenErrorKind::Io,
        };
        OpenError::new(kind, e.to_string())
    }
}

/// Reads banks produced by the authoring tool.
///
/// Every handle returned by `open` is passed back to `close` exactly once.
/// `enumerate_global_parameters` reports the global parameters declared by the
/// banks that are currently open.
pub trait BankReader {
    type Handle;

    fn open(&mut self, path: &Path) -> Result<Self::Handle, OpenError>;

    fn identity(&self, handle: &Self::Handle) -> Guid;

    fn enumerate_events(&self, handle: &Self::Handle) -> Vec<EventDescriptor>;

    fn enumerate_global_parameters(&self) -> Vec<ParameterDescriptor>;

    fn close(&mut self, handle: Self::Handle);
}
