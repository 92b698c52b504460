//! Adapter errors.
//!
//! Every failure leaving `CapFs` carries one of three POSIX-style codes so a
//! path-based caller can branch on `code()` the way it would on a native errno.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Type-erased error used inside operations before normalisation.
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Errno {
    Enoent,
    Enotsup,
    Unknown,
}

impl Errno {
    pub fn as_str(self) -> &'static str {
        match self {
            Errno::Enoent => "ENOENT",
            Errno::Enotsup => "ENOTSUP",
            Errno::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("ENOENT: No such file or directory, {path}")]
    NotFound {
        path: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("ENOTSUP: {op}() is not supported by capability-handle stores")]
    NotSupported { op: &'static str },

    #[error("UNKNOWN: {source}")]
    Unknown {
        #[source]
        source: BoxError,
    },
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound {
            path: path.into(),
            source: None,
        }
    }

    /// `ENOENT` that still remembers what the host actually reported.
    pub fn not_found_caused(path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FsError::NotFound {
            path: path.into(),
            source: Some(source.into()),
        }
    }

    pub fn not_supported(op: &'static str) -> Self {
        FsError::NotSupported { op }
    }

    pub fn unknown(source: impl Into<BoxError>) -> Self {
        FsError::Unknown {
            source: source.into(),
        }
    }

    pub fn code(&self) -> Errno {
        match self {
            FsError::NotFound { .. } => Errno::Enoent,
            FsError::NotSupported { .. } => Errno::Enotsup,
            FsError::Unknown { .. } => Errno::Unknown,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Errno::Enoent
    }

    /// Maps any error escaping an operation onto the adapter taxonomy.
    ///
    /// Errors that already carry a code pass through untouched; anything else
    /// becomes `UNKNOWN` with the original kept as `source()`.
    pub fn normalize(err: BoxError) -> Self {
        match err.downcast::<FsError>() {
            Ok(fs_err) => *fs_err,
            Err(other) => FsError::Unknown { source: other },
        }
    }
}
