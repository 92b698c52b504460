//! Path-based filesystem surface over capability handles.
//!
//! Submodules:
//! - `path`: normalisation and splitting helpers
//! - `cache`: directory handle cache keyed by normalized path
//! - `resolver`: walks from the root handle to the handle behind a path
//! - `io`: whole-file read/write strategies
//! - `stat`: synthetic POSIX metadata
//! - `instrument`: tracing and error normalisation around each operation
//! - `fs`: the `CapFs` operation surface
//! - `demo`: end-to-end walkthrough used by the binary

pub mod cache;
pub mod demo;
pub mod fs;
pub mod instrument;
pub mod io;
pub mod path;
pub mod resolver;
pub mod stat;
