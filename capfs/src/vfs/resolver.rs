//! Handle resolution: turn a normalized path into a capability handle by
//! walking from the root, one directory at a time.

use super::cache::DirCache;
use super::path::{is_root, join, segments, split_parent};
use crate::error::{BoxError, FsError};
use crate::host::{DirectoryHandle, HandleKind};

/// A handle of either kind.
pub enum Handle<D: DirectoryHandle> {
    File(D::File),
    Directory(D),
}

impl<D: DirectoryHandle> Handle<D> {
    pub fn into_file(self) -> Option<D::File> {
        match self {
            Handle::File(f) => Some(f),
            Handle::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<D> {
        match self {
            Handle::Directory(d) => Some(d),
            Handle::File(_) => None,
        }
    }
}

/// Outcome of resolving a path: the parent it lives in, its final name, and
/// the handle if the entry exists with the requested kind.
pub struct Lookup<D: DirectoryHandle> {
    pub parent: D,
    pub name: String,
    pub handle: Option<Handle<D>>,
}

pub struct Resolver<D: DirectoryHandle> {
    root: D,
    cache: DirCache<D>,
}

impl<D: DirectoryHandle> Resolver<D> {
    pub fn new(root: D, cache_capacity: u64) -> Self {
        Self {
            root,
            cache: DirCache::new(cache_capacity),
        }
    }

    pub fn root(&self) -> &D {
        &self.root
    }

    pub fn cache(&self) -> &DirCache<D> {
        &self.cache
    }

    /// Directory handle for `path`, treating every segment as a directory.
    ///
    /// Without `create` a missing segment is `ENOENT`; with `create` missing
    /// segments are made and a host refusal is returned as is.
    pub async fn walk(&self, path: &str, create: bool) -> Result<D, BoxError> {
        if is_root(path) {
            return Ok(self.root.clone());
        }
        if let Some(dir) = self.cache.get(path).await {
            return Ok(dir);
        }
        let mut cur = self.root.clone();
        let mut cur_path = String::from("/");
        for seg in segments(path) {
            let next_path = join(&cur_path, seg);
            cur = match self.cache.get(&next_path).await {
                Some(dir) => dir,
                None => {
                    let dir = match cur.get_directory_handle(seg, create).await {
                        Ok(dir) => dir,
                        Err(e) if !create => return Err(FsError::not_found_caused(path, e).into()),
                        Err(e) => return Err(e.into()),
                    };
                    self.cache.insert(next_path.clone(), dir.clone()).await;
                    dir
                }
            };
            cur_path = next_path;
        }
        Ok(cur)
    }

    /// Parent directory of a non-root path plus the final name.
    pub async fn parent(&self, path: &str) -> Result<(D, String), BoxError> {
        let (parent_path, name) =
            split_parent(path).ok_or_else(|| FsError::not_found(path))?;
        let parent = self.walk(parent_path, false).await?;
        Ok((parent, name.to_string()))
    }

    pub async fn resolve(
        &self,
        path: &str,
        kind: HandleKind,
        create: bool,
    ) -> Result<Lookup<D>, BoxError> {
        let Some((parent_path, name)) = split_parent(path) else {
            return match kind {
                HandleKind::Directory => Ok(Lookup {
                    parent: self.root.clone(),
                    name: String::new(),
                    handle: Some(Handle::Directory(self.root.clone())),
                }),
                HandleKind::File if create => Err(FsError::not_found(path).into()),
                HandleKind::File => Ok(Lookup {
                    parent: self.root.clone(),
                    name: String::new(),
                    handle: None,
                }),
            };
        };

        let parent = self.walk(parent_path, create).await?;
        let handle = match kind {
            HandleKind::Directory => match self.cache.get(path).await {
                Some(dir) => Some(Handle::Directory(dir)),
                None => match parent.get_directory_handle(name, create).await {
                    Ok(dir) => {
                        self.cache.insert(path.to_string(), dir.clone()).await;
                        Some(Handle::Directory(dir))
                    }
                    Err(e) if create => return Err(FsError::not_found_caused(path, e).into()),
                    Err(e) if e.is_absent() => None,
                    Err(e) => return Err(e.into()),
                },
            },
            HandleKind::File => match parent.get_file_handle(name, create).await {
                Ok(file) => Some(Handle::File(file)),
                Err(e) if create => return Err(FsError::not_found_caused(path, e).into()),
                Err(e) if e.is_absent() => None,
                Err(e) => return Err(e.into()),
            },
        };
        Ok(Lookup {
            parent,
            name: name.to_string(),
            handle,
        })
    }

    pub async fn resolve_file(&self, path: &str, create: bool) -> Result<Option<D::File>, BoxError> {
        let lookup = self.resolve(path, HandleKind::File, create).await?;
        Ok(lookup.handle.and_then(Handle::into_file))
    }

    pub async fn resolve_dir(&self, path: &str, create: bool) -> Result<Option<D>, BoxError> {
        let lookup = self.resolve(path, HandleKind::Directory, create).await?;
        Ok(lookup.handle.and_then(Handle::into_directory))
    }
}
