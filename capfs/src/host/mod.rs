//! Capability host abstraction.
//!
//! A host exposes its storage only through handles: a directory handle hands
//! out child handles by name, a file handle hands out its bytes. Nothing in
//! here accepts a path; the adapter in `vfs` walks from the root instead.
//!
//! Submodules:
//! - `memory`: in-process tree, used by tests and the demo
//! - `localfs`: handles over a real directory on disk

pub mod localfs;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("NotFoundError: {0}")]
    NotFound(String),

    #[error("TypeMismatchError: {0}")]
    TypeMismatch(String),

    #[error("InvalidModificationError: {0}")]
    InvalidModification(String),

    #[error("NoModificationAllowedError: {0}")]
    NoModificationAllowed(String),

    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    #[error("TypeError: invalid entry name {0:?}")]
    InvalidName(String),

    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
}

pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    /// The requested entry is not there, or not there with the requested kind.
    pub fn is_absent(&self) -> bool {
        matches!(self, HostError::NotFound(_) | HostError::TypeMismatch(_))
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HostError::NotFound(err.to_string()),
            _ => HostError::Io(err),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    File,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostEntry {
    pub name: String,
    pub kind: HandleKind,
}

/// What the host reports about a file without reading it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    /// Milliseconds since the Unix epoch, if the host knows it.
    pub last_modified: Option<i64>,
}

/// Entry names are single components; anything that could smuggle a path is rejected.
pub fn validate_name(name: &str) -> HostResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(HostError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
pub trait DirectoryHandle: Clone + Send + Sync + 'static {
    type File: FileHandle;

    fn name(&self) -> &str;

    /// Whether files under this handle can open exclusive sync access handles.
    fn supports_sync_access(&self) -> bool {
        false
    }

    async fn get_directory_handle(&self, name: &str, create: bool) -> HostResult<Self>;

    async fn get_file_handle(&self, name: &str, create: bool) -> HostResult<Self::File>;

    async fn remove_entry(&self, name: &str, recursive: bool) -> HostResult<()>;

    async fn entries(&self) -> HostResult<Vec<HostEntry>>;
}

#[async_trait]
pub trait FileHandle: Clone + Send + Sync + 'static {
    type Access: SyncAccessHandle;
    type Writable: WritableFileStream;

    fn name(&self) -> &str;

    async fn file_info(&self) -> HostResult<FileInfo>;

    /// Snapshot of the whole file.
    async fn read_contents(&self) -> HostResult<Bytes>;

    /// Stream whose writes become visible only once `close` succeeds.
    async fn create_writable(&self) -> HostResult<Self::Writable>;

    /// Exclusive handle; the file stays locked until `close`.
    async fn create_sync_access_handle(&self) -> HostResult<Self::Access>;
}

/// Synchronous, exclusive byte access to one file.
pub trait SyncAccessHandle: Send + 'static {
    fn get_size(&self) -> HostResult<u64>;
    fn read(&mut self, buf: &mut [u8], at: u64) -> HostResult<usize>;
    fn write(&mut self, buf: &[u8], at: u64) -> HostResult<usize>;
    fn truncate(&mut self, size: u64) -> HostResult<()>;
    fn flush(&mut self) -> HostResult<()>;
    fn close(&mut self) -> HostResult<()>;
}

#[async_trait]
pub trait WritableFileStream: Send + 'static {
    async fn write(&mut self, data: &[u8]) -> HostResult<()>;
    async fn close(&mut self) -> HostResult<()>;
    async fn abort(&mut self) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(matches!(validate_name(bad), Err(HostError::InvalidName(_))), "{bad:?}");
        }
        assert!(validate_name(".git").is_ok());
        assert!(validate_name("config.yaml").is_ok());
    }

    #[test]
    fn io_not_found_maps_to_host_not_found() {
        let err: HostError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(err.is_absent());
        let err: HostError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, HostError::Io(_)));
        assert!(!err.is_absent());
    }
}
