//! Local directory host: capability handles backed by a directory on disk.
//!
//! Handles keep their on-disk path to themselves; callers only ever move
//! through `get_directory_handle` / `get_file_handle` with single names.
//! Writable streams stage in memory and commit through an anonymous temp file
//! in the target's directory, persisted over the target on `close`.

use super::{
    DirectoryHandle, FileHandle, FileInfo, HandleKind, HostEntry, HostError, HostResult,
    SyncAccessHandle, WritableFileStream, validate_name,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct LocalDir {
    path: PathBuf,
    name: String,
}

impl LocalDir {
    /// Opens `root` as the root handle, creating it if needed.
    pub async fn open<P: AsRef<Path>>(root: P) -> HostResult<Self> {
        let path = root.as_ref().to_path_buf();
        fs::create_dir_all(&path).await?;
        Ok(Self {
            path,
            name: String::new(),
        })
    }

    fn child(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

#[async_trait]
impl DirectoryHandle for LocalDir {
    type File = LocalFile;

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_sync_access(&self) -> bool {
        true
    }

    async fn get_directory_handle(&self, name: &str, create: bool) -> HostResult<Self> {
        validate_name(name)?;
        let path = self.child(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(HostError::TypeMismatch(format!("{name} is a file"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                match fs::create_dir(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            path,
            name: name.to_string(),
        })
    }

    async fn get_file_handle(&self, name: &str, create: bool) -> HostResult<LocalFile> {
        validate_name(name)?;
        let path = self.child(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(HostError::TypeMismatch(format!("{name} is a directory"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(LocalFile {
            path,
            name: name.to_string(),
        })
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> HostResult<()> {
        validate_name(name)?;
        let path = self.child(name);
        let meta = fs::symlink_metadata(&path).await?;
        if !meta.is_dir() {
            fs::remove_file(&path).await?;
            return Ok(());
        }
        if recursive {
            fs::remove_dir_all(&path).await?;
            return Ok(());
        }
        let mut rd = fs::read_dir(&path).await?;
        if rd.next_entry().await?.is_some() {
            return Err(HostError::InvalidModification(format!("{name} is not empty")));
        }
        fs::remove_dir(&path).await?;
        Ok(())
    }

    async fn entries(&self) -> HostResult<Vec<HostEntry>> {
        let mut out = Vec::new();
        let mut rd = fs::read_dir(&self.path).await?;
        while let Some(entry) = rd.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = %self.path.display(), "skipping entry with a non UTF-8 name");
                continue;
            };
            let kind = if entry.file_type().await?.is_dir() {
                HandleKind::Directory
            } else {
                HandleKind::File
            };
            out.push(HostEntry { name, kind });
        }
        Ok(out)
    }
}

#[derive(Clone, Debug)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
}

#[async_trait]
impl FileHandle for LocalFile {
    type Access = LocalSyncAccess;
    type Writable = LocalWritable;

    fn name(&self) -> &str {
        &self.name
    }

    async fn file_info(&self) -> HostResult<FileInfo> {
        let meta = fs::metadata(&self.path).await?;
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_millis()).ok());
        Ok(FileInfo {
            size: meta.len(),
            last_modified,
        })
    }

    async fn read_contents(&self) -> HostResult<Bytes> {
        Ok(Bytes::from(fs::read(&self.path).await?))
    }

    async fn create_writable(&self) -> HostResult<LocalWritable> {
        Ok(LocalWritable {
            target: self.path.clone(),
            staged: Vec::new(),
            open: true,
        })
    }

    async fn create_sync_access_handle(&self) -> HostResult<LocalSyncAccess> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;
        Ok(LocalSyncAccess { file: Some(file) })
    }
}

pub struct LocalSyncAccess {
    file: Option<std::fs::File>,
}

impl LocalSyncAccess {
    fn file(&mut self) -> HostResult<&mut std::fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| HostError::InvalidState("sync access handle is closed".into()))
    }
}

impl SyncAccessHandle for LocalSyncAccess {
    fn get_size(&self) -> HostResult<u64> {
        match &self.file {
            Some(f) => Ok(f.metadata()?.len()),
            None => Err(HostError::InvalidState("sync access handle is closed".into())),
        }
    }

    fn read(&mut self, buf: &mut [u8], at: u64) -> HostResult<usize> {
        let f = self.file()?;
        f.seek(SeekFrom::Start(at))?;
        Ok(f.read(buf)?)
    }

    fn write(&mut self, buf: &[u8], at: u64) -> HostResult<usize> {
        let f = self.file()?;
        f.seek(SeekFrom::Start(at))?;
        Ok(f.write(buf)?)
    }

    fn truncate(&mut self, size: u64) -> HostResult<()> {
        self.file()?.set_len(size)?;
        Ok(())
    }

    fn flush(&mut self) -> HostResult<()> {
        let f = self.file()?;
        f.flush()?;
        f.sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> HostResult<()> {
        self.file.take();
        Ok(())
    }
}

pub struct LocalWritable {
    target: PathBuf,
    staged: Vec<u8>,
    open: bool,
}

#[async_trait]
impl WritableFileStream for LocalWritable {
    async fn write(&mut self, data: &[u8]) -> HostResult<()> {
        if !self.open {
            return Err(HostError::InvalidState("stream is closed".into()));
        }
        self.staged.extend_from_slice(data);
        Ok(())
    }

    async fn close(&mut self) -> HostResult<()> {
        if !self.open {
            return Err(HostError::InvalidState("stream is closed".into()));
        }
        self.open = false;
        let target = self.target.clone();
        let data = std::mem::take(&mut self.staged);
        tokio::task::spawn_blocking(move || commit(&target, &data))
            .await
            .map_err(|e| HostError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    async fn abort(&mut self) -> HostResult<()> {
        self.open = false;
        self.staged.clear();
        Ok(())
    }
}

fn commit(target: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_data()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_localdir_walk_and_kinds() {
        let tmp = tempdir().unwrap();
        let root = LocalDir::open(tmp.path()).await.unwrap();
        let sub = root.get_directory_handle("sub", true).await.unwrap();
        sub.get_file_handle("f.txt", true).await.unwrap();

        assert!(tmp.path().join("sub/f.txt").is_file());
        assert!(matches!(
            root.get_file_handle("sub", false).await,
            Err(HostError::TypeMismatch(_))
        ));
        assert!(matches!(
            root.get_directory_handle("nope", false).await,
            Err(HostError::NotFound(_))
        ));
        assert!(matches!(
            root.get_directory_handle("..", true).await,
            Err(HostError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_writable_commits_on_close_only() {
        let tmp = tempdir().unwrap();
        let root = LocalDir::open(tmp.path()).await.unwrap();
        let file = root.get_file_handle("a", true).await.unwrap();

        let mut w = file.create_writable().await.unwrap();
        w.write(b"payload").await.unwrap();
        assert!(file.read_contents().await.unwrap().is_empty());
        w.close().await.unwrap();
        assert!(w.close().await.is_err());

        assert_eq!(&file.read_contents().await.unwrap()[..], b"payload");
        let names: Vec<_> = root.entries().await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_sync_access_read_write() {
        let tmp = tempdir().unwrap();
        let root = LocalDir::open(tmp.path()).await.unwrap();
        let file = root.get_file_handle("b", true).await.unwrap();

        let mut access = file.create_sync_access_handle().await.unwrap();
        access.truncate(0).unwrap();
        assert_eq!(access.write(b"hello", 0).unwrap(), 5);
        access.flush().unwrap();
        assert_eq!(access.get_size().unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(access.read(&mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        access.close().unwrap();
        assert!(access.get_size().is_err());

        let info = file.file_info().await.unwrap();
        assert_eq!(info.size, 5);
        assert!(info.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_remove_entry_respects_recursive_flag() {
        let tmp = tempdir().unwrap();
        let root = LocalDir::open(tmp.path()).await.unwrap();
        let d = root.get_directory_handle("d", true).await.unwrap();
        d.get_file_handle("x", true).await.unwrap();

        assert!(matches!(
            root.remove_entry("d", false).await,
            Err(HostError::InvalidModification(_))
        ));
        root.remove_entry("d", true).await.unwrap();
        assert!(!tmp.path().join("d").exists());
    }

    #[tokio::test]
    async fn test_entries_list_every_name() {
        let tmp = tempdir().unwrap();
        let root = LocalDir::open(tmp.path()).await.unwrap();
        let file = root.get_file_handle("notes.crswap", true).await.unwrap();
        let mut w = file.create_writable().await.unwrap();
        w.write(b"kept").await.unwrap();
        w.close().await.unwrap();

        let entries = root.entries().await.unwrap();
        assert_eq!(
            entries,
            vec![HostEntry { name: "notes.crswap".into(), kind: HandleKind::File }]
        );
    }
}
