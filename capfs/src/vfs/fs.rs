//! `CapFs`: the path-based operation surface.
//!
//! Paths are normalized on entry, resolved to handles by walking from the
//! root, and every operation runs through `instrument::invoke` so callers only
//! ever see `FsError` with an `ENOENT` / `ENOTSUP` / `UNKNOWN` code.

use super::cache::DirCache;
use super::instrument::invoke;
use super::io::{IoStrategy, select};
use super::path::{is_root, normalize};
use super::resolver::Resolver;
use super::stat::Stats;
use crate::config::CapFsConfig;
use crate::error::{BoxError, FsError, FsResult};
use crate::host::{DirectoryHandle, FileHandle, HandleKind, HostResult};
use futures::{StreamExt, stream};
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    pub encoding: Option<Encoding>,
}

impl ReadOptions {
    pub fn utf8() -> Self {
        Self {
            encoding: Some(Encoding::Utf8),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum FileContents {
    Bytes(Vec<u8>),
    Text(String),
}

impl FileContents {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContents::Bytes(b) => b,
            FileContents::Text(s) => s.as_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContents::Text(s) => Some(s),
            FileContents::Bytes(_) => None,
        }
    }
}

// File bodies can be large; traces only need their length.
impl fmt::Debug for FileContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContents::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            FileContents::Text(s) => write!(f, "Text(len={})", s.len()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReaddirOptions {
    pub with_file_types: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: HandleKind,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == HandleKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == HandleKind::Directory
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    Names(Vec<String>),
    Entries(Vec<DirEntry>),
}

impl Listing {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Listing::Names(names) => names.iter().map(String::as_str).collect(),
            Listing::Entries(entries) => entries.iter().map(|e| e.name.as_str()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listing::Names(names) => names.len(),
            Listing::Entries(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub path: String,
    pub size: u64,
}

pub struct CapFs<D: DirectoryHandle> {
    resolver: Resolver<D>,
    io: Box<dyn IoStrategy<D::File>>,
    removal_concurrency: usize,
    trace: bool,
}

impl<D: DirectoryHandle> CapFs<D> {
    /// Wraps a root directory handle.
    pub fn new(root: D, config: CapFsConfig) -> Self {
        let io = select(config.prefer_sync_access, root.supports_sync_access());
        debug!(
            strategy = io.name(),
            removal_concurrency = config.removal_concurrency,
            "capfs ready"
        );
        Self {
            resolver: Resolver::new(root, config.dir_cache_capacity),
            io,
            removal_concurrency: config.removal_concurrency.max(1),
            trace: config.trace,
        }
    }

    /// Like `new`, for hosts that hand out their root asynchronously.
    pub async fn connect<F>(root: F, config: CapFsConfig) -> FsResult<Self>
    where
        F: Future<Output = HostResult<D>>,
    {
        let root = root.await.map_err(FsError::unknown)?;
        Ok(Self::new(root, config))
    }

    /// Name of the I/O strategy in use: `"exclusive"` or `"copy"`.
    pub fn io_strategy(&self) -> &'static str {
        self.io.name()
    }

    pub fn cache(&self) -> &DirCache<D> {
        self.resolver.cache()
    }

    pub fn root(&self) -> &D {
        self.resolver.root()
    }

    pub async fn read_file(&self, path: &str, opts: ReadOptions) -> FsResult<FileContents> {
        invoke(self.trace, "read_file", &(path, opts), async {
            let path = normalize(path);
            let file = self
                .resolver
                .resolve_file(&path, false)
                .await?
                .ok_or_else(|| FsError::not_found(&path))?;
            let data = self.io.read_all(&file).await?;
            Ok(match opts.encoding {
                Some(Encoding::Utf8) => {
                    FileContents::Text(String::from_utf8_lossy(&data).into_owned())
                }
                None => FileContents::Bytes(data),
            })
        })
        .await
    }

    /// Creates the file and any missing parents, then replaces its content.
    pub async fn write_file(&self, path: &str, data: impl AsRef<[u8]>) -> FsResult<()> {
        let data = data.as_ref();
        invoke(self.trace, "write_file", &(path, data.len()), async {
            let path = normalize(path);
            self.write_inner(&path, data).await
        })
        .await
    }

    async fn write_inner(&self, path: &str, data: &[u8]) -> Result<(), BoxError> {
        self.cache().invalidate_subtree(path).await;
        let file = self
            .resolver
            .resolve_file(path, true)
            .await?
            .ok_or_else(|| FsError::not_found(path))?;
        self.io.write_all(&file, data).await
    }

    /// `mkdir -p`: existing directories are left alone.
    pub async fn mkdir(&self, path: &str) -> FsResult<()> {
        invoke(self.trace, "mkdir", &path, async {
            let path = normalize(path);
            if is_root(&path) {
                return Ok(());
            }
            self.cache().invalidate_subtree(&path).await;
            self.resolver.walk(&path, true).await?;
            Ok(())
        })
        .await
    }

    /// Recursive removal. On `/` the root itself stays and its children are
    /// removed with at most `removal_concurrency` removals in flight. A failed
    /// removal does not stop the rest of the queue.
    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        invoke(self.trace, "rmdir", &path, async {
            let path = normalize(path);
            if is_root(&path) {
                return self.clear_root().await;
            }
            self.cache().invalidate_subtree(&path).await;
            let (parent, name) = self.resolver.parent(&path).await?;
            parent
                .remove_entry(&name, true)
                .await
                .map_err(|e| FsError::not_found_caused(&path, e))?;
            Ok(())
        })
        .await
    }

    async fn clear_root(&self) -> Result<(), BoxError> {
        let root = self.resolver.root().clone();
        let entries = root.entries().await?;
        self.cache().invalidate_subtree("/").await;
        debug!(
            entries = entries.len(),
            concurrency = self.removal_concurrency,
            "clearing root"
        );
        let results = stream::iter(entries)
            .map(|entry| {
                let root = root.clone();
                async move { root.remove_entry(&entry.name, true).await }
            })
            .buffer_unordered(self.removal_concurrency)
            .collect::<Vec<_>>()
            .await;
        // Every queued removal has run; report the first failure, if any.
        let failed = results.iter().filter(|r| r.is_err()).count();
        match results.into_iter().find_map(Result::err) {
            Some(e) => {
                warn!(failed, "some root entries could not be removed");
                Err(e.into())
            }
            None => Ok(()),
        }
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        invoke(self.trace, "unlink", &path, async {
            let path = normalize(path);
            self.unlink_inner(&path).await
        })
        .await
    }

    async fn unlink_inner(&self, path: &str) -> Result<(), BoxError> {
        self.cache().invalidate_subtree(path).await;
        let lookup = self.resolver.resolve(path, HandleKind::File, false).await?;
        if lookup.handle.is_none() {
            return Err(FsError::not_found(path).into());
        }
        lookup
            .parent
            .remove_entry(&lookup.name, false)
            .await
            .map_err(|e| FsError::not_found_caused(path, e))?;
        Ok(())
    }

    pub async fn readdir(&self, path: &str, opts: ReaddirOptions) -> FsResult<Listing> {
        invoke(self.trace, "readdir", &(path, opts), async {
            let path = normalize(path);
            let dir = self
                .resolver
                .resolve_dir(&path, false)
                .await?
                .ok_or_else(|| FsError::not_found(&path))?;
            let entries = dir.entries().await?;
            Ok(if opts.with_file_types {
                Listing::Entries(
                    entries
                        .into_iter()
                        .map(|e| DirEntry {
                            name: e.name,
                            kind: e.kind,
                        })
                        .collect(),
                )
            } else {
                Listing::Names(entries.into_iter().map(|e| e.name).collect())
            })
        })
        .await
    }

    pub async fn stat(&self, path: &str) -> FsResult<Stats> {
        invoke(self.trace, "stat", &path, self.stat_inner(path)).await
    }

    /// Same as `stat`; there are no links to not follow.
    pub async fn lstat(&self, path: &str) -> FsResult<Stats> {
        invoke(self.trace, "lstat", &path, self.stat_inner(path)).await
    }

    async fn stat_inner(&self, path: &str) -> Result<Stats, BoxError> {
        let path = normalize(path);
        if is_root(&path) {
            return Ok(Stats::directory());
        }
        let (parent, name) = self
            .resolver
            .parent(&path)
            .await
            .map_err(|e| FsError::not_found_caused(&path, e))?;
        let (file, dir) = futures::join!(
            parent.get_file_handle(&name, false),
            parent.get_directory_handle(&name, false)
        );
        if dir.is_ok() {
            return Ok(Stats::directory());
        }
        match file {
            Ok(file) => Ok(Stats::file(&file.file_info().await?)),
            Err(e) => Err(FsError::not_found_caused(&path, e).into()),
        }
    }

    /// `stat` for callers that only distinguish present from absent: every
    /// failure is reported as `ENOENT`.
    pub async fn back_file(&self, path: &str) -> FsResult<Stats> {
        invoke(self.trace, "back_file", &path, async {
            self.stat_inner(path).await.map_err(|e| -> BoxError {
                let err = FsError::normalize(e);
                if err.is_not_found() {
                    err.into()
                } else {
                    FsError::not_found_caused(normalize(path), err).into()
                }
            })
        })
        .await
    }

    pub async fn du(&self, path: &str) -> FsResult<DiskUsage> {
        invoke(self.trace, "du", &path, async {
            let stats = self.stat_inner(path).await?;
            Ok(DiskUsage {
                path: normalize(path),
                size: stats.size,
            })
        })
        .await
    }

    /// `Ok(false)` only for `ENOENT`; other failures are still errors.
    pub async fn exists(&self, path: &str) -> FsResult<bool> {
        invoke(self.trace, "exists", &path, async {
            match self.stat_inner(path).await {
                Ok(_) => Ok(true),
                Err(e) => {
                    let err = FsError::normalize(e);
                    if err.is_not_found() {
                        Ok(false)
                    } else {
                        Err(err.into())
                    }
                }
            }
        })
        .await
    }

    /// Copy then delete. Not atomic: if deleting `old` fails both paths hold
    /// the content.
    pub async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        invoke(self.trace, "rename", &(old, new), async {
            let old = normalize(old);
            let new = normalize(new);
            self.cache().invalidate_subtree(&old).await;
            self.cache().invalidate_subtree(&new).await;

            let file = self
                .resolver
                .resolve_file(&old, false)
                .await?
                .ok_or_else(|| FsError::not_found(&old))?;
            if old == new {
                return Ok(());
            }
            let data = self.io.read_all(&file).await?;
            self.write_inner(&new, &data).await?;
            self.unlink_inner(&old).await
        })
        .await
    }

    pub async fn symlink(&self, target: &str, path: &str) -> FsResult<()> {
        invoke(self.trace, "symlink", &(target, path), async {
            Err(FsError::not_supported("symlink").into())
        })
        .await
    }

    pub async fn readlink(&self, path: &str) -> FsResult<String> {
        invoke(self.trace, "readlink", &path, async {
            Err(FsError::not_supported("readlink").into())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Errno;
    use crate::host::memory::MemoryHost;

    fn memory_fs() -> (MemoryHost, CapFs<crate::host::memory::MemoryDir>) {
        let host = MemoryHost::new();
        let fs = CapFs::new(host.root(), CapFsConfig::default());
        (host, fs)
    }

    #[tokio::test]
    async fn test_picks_strategy_from_host() {
        let (_host, fs) = memory_fs();
        assert_eq!(fs.io_strategy(), "exclusive");

        let host = MemoryHost::without_sync_access();
        let fs = CapFs::new(host.root(), CapFsConfig::default());
        assert_eq!(fs.io_strategy(), "copy");

        let host = MemoryHost::new();
        let fs = CapFs::new(host.root(), CapFsConfig::default().with_sync_access(false));
        assert_eq!(fs.io_strategy(), "copy");
    }

    #[tokio::test]
    async fn test_connect_awaits_root() {
        let host = MemoryHost::new();
        let root = host.root();
        let fs = CapFs::connect(async move { Ok(root) }, CapFsConfig::default())
            .await
            .unwrap();
        fs.write_file("/x", "1").await.unwrap();
        assert!(fs.exists("/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_as_text_and_bytes() {
        let (_host, fs) = memory_fs();
        fs.write_file("/notes/a.txt", "héllo").await.unwrap();

        let text = fs.read_file("/notes/a.txt", ReadOptions::utf8()).await.unwrap();
        assert_eq!(text.as_text(), Some("héllo"));
        assert_eq!(text.as_bytes(), "héllo".as_bytes());
        let raw = fs.read_file("notes/./a.txt", ReadOptions::default()).await.unwrap();
        assert_eq!(raw, FileContents::Bytes("héllo".as_bytes().to_vec()));
        assert_eq!(format!("{raw:?}"), "Bytes(len=6)");
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_subtree() {
        let (_host, fs) = memory_fs();
        fs.mkdir("/a/b").await.unwrap();
        assert!(fs.cache().contains("/a/b"));

        fs.rmdir("/a").await.unwrap();
        assert!(!fs.cache().contains("/a"));
        assert!(!fs.cache().contains("/a/b"));

        fs.write_file("/a/b", "now a file").await.unwrap();
        assert!(!fs.cache().contains("/a/b"));
        assert!(fs.stat("/a/b").await.unwrap().is_file());
    }

    #[tokio::test]
    async fn test_stat_root_and_missing() {
        let (_host, fs) = memory_fs();
        assert!(fs.stat("/").await.unwrap().is_directory());
        assert!(fs.lstat("/").await.unwrap().is_directory());
        assert_eq!(fs.stat("/nope").await.unwrap_err().code(), Errno::Enoent);
        assert_eq!(fs.stat("/no/such/dir").await.unwrap_err().code(), Errno::Enoent);
        assert!(!fs.exists("/nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_du_and_back_file() {
        let (_host, fs) = memory_fs();
        fs.write_file("/d/f", vec![7u8; 12]).await.unwrap();

        let usage = fs.du("d/../d/f").await.unwrap();
        assert_eq!(usage, DiskUsage { path: "/d/f".into(), size: 12 });
        assert_eq!(fs.du("/d").await.unwrap().size, 0);
        assert_eq!(fs.back_file("/d/f").await.unwrap().size, 12);
        assert_eq!(fs.back_file("/gone").await.unwrap_err().code(), Errno::Enoent);
    }

    #[tokio::test]
    async fn test_rename_onto_itself_keeps_file() {
        let (_host, fs) = memory_fs();
        fs.write_file("/same", "data").await.unwrap();
        fs.rename("/same", "//same").await.unwrap();
        let got = fs.read_file("/same", ReadOptions::utf8()).await.unwrap();
        assert_eq!(got.as_text(), Some("data"));
    }

    #[tokio::test]
    async fn test_unlink_refuses_directories() {
        let (_host, fs) = memory_fs();
        fs.mkdir("/dir").await.unwrap();
        assert_eq!(fs.unlink("/dir").await.unwrap_err().code(), Errno::Enoent);
        assert!(fs.stat("/dir").await.unwrap().is_directory());
    }
}
