//! End-to-end walkthrough: lay out a small working tree the way a
//! version-control engine would, read it back, move a file, then wipe it.

use super::fs::{CapFs, ReadOptions, ReaddirOptions};
use crate::config::CapFsConfig;
use crate::error::{FsError, FsResult};
use crate::host::DirectoryHandle;
use crate::host::localfs::LocalDir;
use std::path::Path;
use tracing::info;

/// Runs the walkthrough on `fs` and returns one line per step.
pub async fn walkthrough<D: DirectoryHandle>(fs: &CapFs<D>) -> FsResult<Vec<String>> {
    let mut report = Vec::new();

    fs.mkdir("/repo/.git/objects").await?;
    fs.write_file("/repo/.git/HEAD", "ref: refs/heads/main\n").await?;
    fs.write_file("/repo/README.md", "# demo\n").await?;
    fs.write_file("/repo/src/lib.rs", "pub fn answer() -> u32 { 42 }\n").await?;
    report.push(format!("wrote tree using {} I/O", fs.io_strategy()));

    let head = fs.read_file("/repo/.git/HEAD", ReadOptions::utf8()).await?;
    if head.as_text() != Some("ref: refs/heads/main\n") {
        return Err(FsError::unknown("HEAD content mismatch"));
    }
    let listing = fs
        .readdir("/repo", ReaddirOptions { with_file_types: true })
        .await?;
    report.push(format!("/repo: {}", listing.names().join(", ")));

    fs.rename("/repo/README.md", "/repo/docs/README.md").await?;
    let moved = fs.stat("/repo/docs/README.md").await?;
    report.push(format!("moved README ({} bytes)", moved.size));
    if fs.exists("/repo/README.md").await? {
        return Err(FsError::unknown("rename left the source behind"));
    }

    let usage = fs.du("/repo/src/lib.rs").await?;
    report.push(format!("du {} = {}", usage.path, usage.size));

    fs.rmdir("/").await?;
    let left = fs.readdir("/", ReaddirOptions::default()).await?;
    report.push(format!("root cleared, {} entries left", left.len()));

    for line in &report {
        info!("{line}");
    }
    Ok(report)
}

/// Same walkthrough against a directory on disk.
pub async fn localfs_demo<P: AsRef<Path>>(root: P, config: CapFsConfig) -> FsResult<Vec<String>> {
    let fs = CapFs::connect(LocalDir::open(root), config).await?;
    walkthrough(&fs).await
}
