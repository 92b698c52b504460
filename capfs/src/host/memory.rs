//! In-memory capability host: a directory tree held in process memory.
//!
//! Behaves like a browser origin-private store closely enough to exercise the
//! adapter: sync access handles lock their file, writable streams commit on
//! `close`, non-recursive removal of a non-empty directory is refused.

use super::{
    DirectoryHandle, FileHandle, FileInfo, HandleKind, HostEntry, HostError, HostResult,
    SyncAccessHandle, WritableFileStream, validate_name,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Default)]
struct HostState {
    sync_access: bool,
    in_flight_removals: AtomicUsize,
    peak_removals: AtomicUsize,
    fail_sync_writes: AtomicBool,
}

#[derive(Default)]
struct DirNode {
    children: Mutex<BTreeMap<String, Node>>,
}

impl DirNode {
    fn holds_locked_file(&self) -> bool {
        lock(&self.children).values().any(|child| match child {
            Node::File(file) => file.locked.load(Ordering::Acquire),
            Node::Dir(dir) => dir.holds_locked_file(),
        })
    }
}

struct FileNode {
    content: Mutex<FileContent>,
    locked: AtomicBool,
}

struct FileContent {
    data: Vec<u8>,
    last_modified: i64,
}

impl FileNode {
    fn empty() -> Self {
        Self {
            content: Mutex::new(FileContent {
                data: Vec::new(),
                last_modified: now_ms(),
            }),
            locked: AtomicBool::new(false),
        }
    }
}

#[derive(Clone)]
enum Node {
    File(Arc<FileNode>),
    Dir(Arc<DirNode>),
}

/// Owner of one in-memory tree. Hands out the root handle and exposes the
/// removal gauge used to observe how many deletions run at once.
pub struct MemoryHost {
    state: Arc<HostState>,
    root: Arc<DirNode>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Host that advertises sync access handles.
    pub fn new() -> Self {
        Self::with_sync_access(true)
    }

    /// Host without sync access handles; only writable streams are available.
    pub fn without_sync_access() -> Self {
        Self::with_sync_access(false)
    }

    fn with_sync_access(sync_access: bool) -> Self {
        Self {
            state: Arc::new(HostState {
                sync_access,
                ..HostState::default()
            }),
            root: Arc::new(DirNode::default()),
        }
    }

    pub fn root(&self) -> MemoryDir {
        MemoryDir {
            name: String::new(),
            node: self.root.clone(),
            state: self.state.clone(),
        }
    }

    /// Removals currently running inside `remove_entry`.
    pub fn in_flight_removals(&self) -> usize {
        self.state.in_flight_removals.load(Ordering::Acquire)
    }

    /// Highest number of simultaneous removals observed so far.
    pub fn peak_removals(&self) -> usize {
        self.state.peak_removals.load(Ordering::Acquire)
    }

    /// Make every sync access `write` fail until switched off again.
    pub fn fail_sync_writes(&self, fail: bool) {
        self.state.fail_sync_writes.store(fail, Ordering::Release);
    }
}

struct RemovalGauge<'a> {
    state: &'a HostState,
}

impl<'a> RemovalGauge<'a> {
    fn enter(state: &'a HostState) -> Self {
        let now = state.in_flight_removals.fetch_add(1, Ordering::AcqRel) + 1;
        state.peak_removals.fetch_max(now, Ordering::AcqRel);
        Self { state }
    }
}

impl Drop for RemovalGauge<'_> {
    fn drop(&mut self) {
        self.state.in_flight_removals.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct MemoryDir {
    name: String,
    node: Arc<DirNode>,
    state: Arc<HostState>,
}

impl MemoryDir {
    fn child_dir(&self, name: &str, node: Arc<DirNode>) -> Self {
        Self {
            name: name.to_string(),
            node,
            state: self.state.clone(),
        }
    }

    fn child_file(&self, name: &str, node: Arc<FileNode>) -> MemoryFile {
        MemoryFile {
            name: name.to_string(),
            node,
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDir {
    type File = MemoryFile;

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_sync_access(&self) -> bool {
        self.state.sync_access
    }

    async fn get_directory_handle(&self, name: &str, create: bool) -> HostResult<Self> {
        validate_name(name)?;
        let mut children = lock(&self.node.children);
        match children.get(name) {
            Some(Node::Dir(dir)) => Ok(self.child_dir(name, dir.clone())),
            Some(Node::File(_)) => Err(HostError::TypeMismatch(format!("{name} is a file"))),
            None if create => {
                let dir = Arc::new(DirNode::default());
                children.insert(name.to_string(), Node::Dir(dir.clone()));
                Ok(self.child_dir(name, dir))
            }
            None => Err(HostError::NotFound(name.to_string())),
        }
    }

    async fn get_file_handle(&self, name: &str, create: bool) -> HostResult<MemoryFile> {
        validate_name(name)?;
        let mut children = lock(&self.node.children);
        match children.get(name) {
            Some(Node::File(file)) => Ok(self.child_file(name, file.clone())),
            Some(Node::Dir(_)) => Err(HostError::TypeMismatch(format!("{name} is a directory"))),
            None if create => {
                let file = Arc::new(FileNode::empty());
                children.insert(name.to_string(), Node::File(file.clone()));
                Ok(self.child_file(name, file))
            }
            None => Err(HostError::NotFound(name.to_string())),
        }
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> HostResult<()> {
        validate_name(name)?;
        let _gauge = RemovalGauge::enter(&self.state);
        // Give concurrent removals a chance to overlap with this one.
        tokio::task::yield_now().await;

        let mut children = lock(&self.node.children);
        match children.get(name) {
            None => return Err(HostError::NotFound(name.to_string())),
            Some(Node::File(file)) if file.locked.load(Ordering::Acquire) => {
                return Err(HostError::NoModificationAllowed(format!("{name} is locked")));
            }
            Some(Node::Dir(dir)) if !recursive && !lock(&dir.children).is_empty() => {
                return Err(HostError::InvalidModification(format!(
                    "{name} is not empty"
                )));
            }
            Some(Node::Dir(dir)) if dir.holds_locked_file() => {
                return Err(HostError::NoModificationAllowed(format!(
                    "{name} contains a locked file"
                )));
            }
            Some(_) => {}
        }
        children.remove(name);
        Ok(())
    }

    async fn entries(&self) -> HostResult<Vec<HostEntry>> {
        let children = lock(&self.node.children);
        Ok(children
            .iter()
            .map(|(name, node)| HostEntry {
                name: name.clone(),
                kind: match node {
                    Node::File(_) => HandleKind::File,
                    Node::Dir(_) => HandleKind::Directory,
                },
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct MemoryFile {
    name: String,
    node: Arc<FileNode>,
    state: Arc<HostState>,
}

impl MemoryFile {
    /// Whether a sync access handle currently holds this file.
    pub fn is_locked(&self) -> bool {
        self.node.locked.load(Ordering::Acquire)
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    type Access = MemorySyncAccess;
    type Writable = MemoryWritable;

    fn name(&self) -> &str {
        &self.name
    }

    async fn file_info(&self) -> HostResult<FileInfo> {
        let content = lock(&self.node.content);
        Ok(FileInfo {
            size: content.data.len() as u64,
            last_modified: Some(content.last_modified),
        })
    }

    async fn read_contents(&self) -> HostResult<Bytes> {
        let content = lock(&self.node.content);
        Ok(Bytes::copy_from_slice(&content.data))
    }

    async fn create_writable(&self) -> HostResult<MemoryWritable> {
        if self.is_locked() {
            return Err(HostError::NoModificationAllowed(format!(
                "{} is locked by a sync access handle",
                self.name
            )));
        }
        Ok(MemoryWritable {
            node: self.node.clone(),
            staged: Vec::new(),
            open: true,
        })
    }

    async fn create_sync_access_handle(&self) -> HostResult<MemorySyncAccess> {
        if !self.state.sync_access {
            return Err(HostError::NotSupported(
                "sync access handles are not available".into(),
            ));
        }
        if self.node.locked.swap(true, Ordering::AcqRel) {
            return Err(HostError::NoModificationAllowed(format!(
                "{} already has an open sync access handle",
                self.name
            )));
        }
        Ok(MemorySyncAccess {
            node: self.node.clone(),
            state: self.state.clone(),
            open: true,
        })
    }
}

pub struct MemorySyncAccess {
    node: Arc<FileNode>,
    state: Arc<HostState>,
    open: bool,
}

impl MemorySyncAccess {
    fn ensure_open(&self) -> HostResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(HostError::InvalidState("sync access handle is closed".into()))
        }
    }
}

impl SyncAccessHandle for MemorySyncAccess {
    fn get_size(&self) -> HostResult<u64> {
        self.ensure_open()?;
        Ok(lock(&self.node.content).data.len() as u64)
    }

    fn read(&mut self, buf: &mut [u8], at: u64) -> HostResult<usize> {
        self.ensure_open()?;
        let content = lock(&self.node.content);
        let start = (at as usize).min(content.data.len());
        let n = buf.len().min(content.data.len() - start);
        buf[..n].copy_from_slice(&content.data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], at: u64) -> HostResult<usize> {
        self.ensure_open()?;
        if self.state.fail_sync_writes.load(Ordering::Acquire) {
            return Err(HostError::InvalidState("injected write failure".into()));
        }
        let mut content = lock(&self.node.content);
        let start = at as usize;
        let end = start + buf.len();
        if content.data.len() < end {
            content.data.resize(end, 0);
        }
        content.data[start..end].copy_from_slice(buf);
        content.last_modified = now_ms();
        Ok(buf.len())
    }

    fn truncate(&mut self, size: u64) -> HostResult<()> {
        self.ensure_open()?;
        let mut content = lock(&self.node.content);
        content.data.resize(size as usize, 0);
        content.last_modified = now_ms();
        Ok(())
    }

    fn flush(&mut self) -> HostResult<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> HostResult<()> {
        if self.open {
            self.open = false;
            self.node.locked.store(false, Ordering::Release);
        }
        Ok(())
    }
}

pub struct MemoryWritable {
    node: Arc<FileNode>,
    staged: Vec<u8>,
    open: bool,
}

#[async_trait]
impl WritableFileStream for MemoryWritable {
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
        let mut content = lock(&self.node.content);
        content.data = std::mem::take(&mut self.staged);
        content.last_modified = now_ms();
        Ok(())
    }

    async fn abort(&mut self) -> HostResult<()> {
        self.open = false;
        self.staged.clear();
        Ok(())
    }
}
