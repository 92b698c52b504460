//! Synthetic POSIX metadata for handle-backed entries.

use crate::host::{FileInfo, HandleKind};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DIR_MODE: u32 = 0o040755;
pub const FILE_MODE: u32 = 0o100644;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stats {
    pub kind: HandleKind,
    pub size: u64,
    pub mode: u32,
    pub ctime: SystemTime,
    pub ctime_ms: i64,
    pub mtime: SystemTime,
    pub mtime_ms: i64,
}

impl Stats {
    /// Directories have no size and no timestamps on these hosts.
    pub fn directory() -> Self {
        Self {
            kind: HandleKind::Directory,
            size: 0,
            mode: DIR_MODE,
            ctime: UNIX_EPOCH,
            ctime_ms: 0,
            mtime: UNIX_EPOCH,
            mtime_ms: 0,
        }
    }

    pub fn file(info: &FileInfo) -> Self {
        let ms = info.last_modified.unwrap_or_else(now_ms);
        let (time, ms) = match from_millis(ms) {
            Some(t) => (t, ms),
            None => (UNIX_EPOCH, 0),
        };
        Self {
            kind: HandleKind::File,
            size: info.size,
            mode: FILE_MODE,
            ctime: time,
            ctime_ms: ms,
            mtime: time,
            mtime_ms: ms,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == HandleKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == HandleKind::Directory
    }

    /// Capability stores have no links.
    pub fn is_symbolic_link(&self) -> bool {
        false
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

/// `None` when the platform's `SystemTime` cannot hold the instant. With
/// 64-bit seconds (Unix) every `i64` millisecond value fits; narrower
/// representations can overflow near the extremes.
fn from_millis(ms: i64) -> Option<SystemTime> {
    let magnitude = Duration::from_millis(ms.unsigned_abs());
    if ms >= 0 {
        UNIX_EPOCH.checked_add(magnitude)
    } else {
        UNIX_EPOCH.checked_sub(magnitude)
    }
}
