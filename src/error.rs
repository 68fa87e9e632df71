//! Error types for bulkpost.
//!
//! These are run-level errors: anything here aborts startup or the whole
//! run. Per-task failures are [`crate::model::Failure`] values and never
//! travel through this type.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which kind of backing collection could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A directory of one-item-per-file `.txt` files.
    Directory,
    /// A newline-delimited text file.
    File,
    /// A delimited (CSV) table.
    Table,
    /// A text path that resolved to neither a file nor a directory.
    Text,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Directory => "directory",
            SourceKind::File => "file",
            SourceKind::Table => "table",
            SourceKind::Text => "file or directory",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no such {kind}: {}", path.display())]
    SourceNotFound { kind: SourceKind, path: PathBuf },

    #[error("item source {0} is empty")]
    EmptySource(String),

    #[error("malformed row {row} in {}: expected {expected} fields, found {found}", path.display())]
    MalformedRow {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown account format: {0}")]
    UnknownAccountFormat(String),

    #[error("no entry in {0} splits into a title and a body")]
    NoUsableContent(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
