//! Library crate for capfs: a POSIX-style filesystem surface over stores that
//! only hand out per-file / per-directory capability handles.
//!
//! Modules:
//! - `host`: capability handle traits plus the in-memory and local-directory hosts
//! - `vfs`: path normalisation, handle resolution, I/O strategies and the `CapFs` surface
//! - `error`: POSIX-coded adapter errors
//! - `config`: adapter settings

pub mod config;
pub mod error;
pub mod host;
pub mod vfs;

pub use config::CapFsConfig;
pub use error::{Errno, FsError, FsResult};
pub use vfs::fs::{
    CapFs, DirEntry, DiskUsage, Encoding, FileContents, Listing, ReadOptions, ReaddirOptions,
};
pub use vfs::stat::Stats;
