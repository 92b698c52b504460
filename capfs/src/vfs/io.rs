//! Whole-file I/O strategies.
//!
//! `ExclusiveIo` goes through a sync access handle that locks the file while
//! it is open. `CopyIo` reads a snapshot and writes through a writable stream
//! that commits on close. The strategy is picked once per `CapFs`.

use crate::error::BoxError;
use crate::host::{FileHandle, HostError, HostResult, SyncAccessHandle, WritableFileStream};
use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use tracing::warn;

#[async_trait]
pub trait IoStrategy<F: FileHandle>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn read_all(&self, file: &F) -> Result<Vec<u8>, BoxError>;

    /// Replaces the full content of `file` with `data`.
    async fn write_all(&self, file: &F, data: &[u8]) -> Result<(), BoxError>;
}

pub fn select<F: FileHandle>(prefer_sync: bool, host_supports_sync: bool) -> Box<dyn IoStrategy<F>> {
    if prefer_sync && host_supports_sync {
        Box::new(ExclusiveIo)
    } else {
        Box::new(CopyIo)
    }
}

/// Keeps a sync access handle open for the duration of one operation and
/// closes it on every exit path.
struct AccessGuard<A: SyncAccessHandle> {
    access: A,
    file: String,
    released: bool,
}

impl<A: SyncAccessHandle> AccessGuard<A> {
    fn new(access: A, file: &str) -> Self {
        Self {
            access,
            file: file.to_string(),
            released: false,
        }
    }

    fn release(mut self) -> HostResult<()> {
        self.released = true;
        self.access.close()
    }

    /// Closes the handle and settles the outcome of `body`.
    ///
    /// A close failure after a failed body is only logged; after a successful
    /// body it is the result, since the data may not have been committed.
    fn finish<T>(self, body: HostResult<T>) -> Result<T, BoxError> {
        let file = self.file.clone();
        match body {
            Ok(v) => {
                self.release()?;
                Ok(v)
            }
            Err(e) => {
                if let Err(close_err) = self.release() {
                    warn!(file = %file, error = %close_err, "failed to close sync access handle");
                }
                Err(e.into())
            }
        }
    }
}

impl<A: SyncAccessHandle> Deref for AccessGuard<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.access
    }
}

impl<A: SyncAccessHandle> DerefMut for AccessGuard<A> {
    fn deref_mut(&mut self) -> &mut A {
        &mut self.access
    }
}

impl<A: SyncAccessHandle> Drop for AccessGuard<A> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.access.close() {
                warn!(file = %self.file, error = %e, "failed to close sync access handle on drop");
            }
        }
    }
}

fn read_through<A: SyncAccessHandle>(access: &mut A) -> HostResult<Vec<u8>> {
    let size = access.get_size()? as usize;
    let mut buf = vec![0u8; size];
    let mut off = 0;
    while off < size {
        let n = access.read(&mut buf[off..], off as u64)?;
        if n == 0 {
            break;
        }
        off += n;
    }
    buf.truncate(off);
    Ok(buf)
}

fn write_through<A: SyncAccessHandle>(access: &mut A, data: &[u8]) -> HostResult<()> {
    access.truncate(0)?;
    let mut off = 0;
    while off < data.len() {
        let n = access.write(&data[off..], off as u64)?;
        if n == 0 {
            return Err(HostError::Io(std::io::ErrorKind::WriteZero.into()));
        }
        off += n;
    }
    access.flush()
}

pub struct ExclusiveIo;

#[async_trait]
impl<F: FileHandle> IoStrategy<F> for ExclusiveIo {
    fn name(&self) -> &'static str {
        "exclusive"
    }

    async fn read_all(&self, file: &F) -> Result<Vec<u8>, BoxError> {
        let mut guard = AccessGuard::new(file.create_sync_access_handle().await?, file.name());
        let body = read_through(&mut *guard);
        guard.finish(body)
    }

    async fn write_all(&self, file: &F, data: &[u8]) -> Result<(), BoxError> {
        let mut guard = AccessGuard::new(file.create_sync_access_handle().await?, file.name());
        let body = write_through(&mut *guard, data);
        guard.finish(body)
    }
}

pub struct CopyIo;

#[async_trait]
impl<F: FileHandle> IoStrategy<F> for CopyIo {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn read_all(&self, file: &F) -> Result<Vec<u8>, BoxError> {
        Ok(file.read_contents().await?.to_vec())
    }

    async fn write_all(&self, file: &F, data: &[u8]) -> Result<(), BoxError> {
        let mut stream = file.create_writable().await?;
        if let Err(e) = stream.write(data).await {
            if let Err(abort_err) = stream.abort().await {
                warn!(file = file.name(), error = %abort_err, "failed to abort writable stream");
            }
            return Err(e.into());
        }
        stream.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DirectoryHandle;
    use crate::host::memory::{MemoryFile, MemoryHost};

    #[tokio::test]
    async fn test_exclusive_round_trip_releases_lock() {
        let host = MemoryHost::new();
        let file = host.root().get_file_handle("f", true).await.unwrap();
        let io: Box<dyn IoStrategy<MemoryFile>> = select(true, true);
        assert_eq!(io.name(), "exclusive");

        io.write_all(&file, b"first version").await.unwrap();
        io.write_all(&file, b"short").await.unwrap();
        assert!(!file.is_locked());
        assert_eq!(io.read_all(&file).await.unwrap(), b"short");
        assert!(!file.is_locked());
    }

    #[tokio::test]
    async fn test_exclusive_write_failure_still_releases() {
        let host = MemoryHost::new();
        let file = host.root().get_file_handle("f", true).await.unwrap();
        host.fail_sync_writes(true);

        let err = ExclusiveIo.write_all(&file, b"data").await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<HostError>(),
            Some(HostError::InvalidState(_))
        ));
        assert!(!file.is_locked());

        host.fail_sync_writes(false);
        ExclusiveIo.write_all(&file, b"data").await.unwrap();
        assert_eq!(&file.read_contents().await.unwrap()[..], b"data");
    }

    #[tokio::test]
    async fn test_copy_round_trip() {
        let host = MemoryHost::without_sync_access();
        let file = host.root().get_file_handle("f", true).await.unwrap();
        let io: Box<dyn IoStrategy<MemoryFile>> = select(true, false);
        assert_eq!(io.name(), "copy");

        io.write_all(&file, b"hello").await.unwrap();
        assert_eq!(io.read_all(&file).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_copy_write_to_locked_file_fails() {
        let host = MemoryHost::new();
        let file = host.root().get_file_handle("f", true).await.unwrap();
        let _held = file.create_sync_access_handle().await.unwrap();

        let err = CopyIo.write_all(&file, b"x").await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<HostError>(),
            Some(HostError::NoModificationAllowed(_))
        ));
    }
}
