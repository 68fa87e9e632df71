//! Item sources: lazy sequences over a finite backing collection.
//!
//! A source is loaded once from disk (lines of a file, one file per item in
//! a directory, or rows of a CSV table) and can then be consumed in one of
//! four modes: a single pass, an endless cycle, an endless sequence of
//! independent shuffles, or a single shuffled pass.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result, SourceKind};

/// Suffix a file needs to be picked up from a directory source.
pub const DIR_ITEM_SUFFIX: &str = ".txt";

/// How an endless source walks its backing collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Cycle in original order ([`ItemSource::infinite`]).
    Sequential,
    /// Reshuffle on every cycle ([`ItemSource::random_infinite`]).
    #[default]
    Random,
}

/// A loaded backing collection.
#[derive(Debug, Clone)]
pub struct ItemSource<T> {
    name: String,
    items: Vec<T>,
}

impl<T> ItemSource<T> {
    /// Wrap an in-memory collection. `name` is only used in errors and logs.
    pub fn from_items(name: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One pass in original order.
    pub fn finite(self) -> std::vec::IntoIter<T> {
        self.items.into_iter()
    }

    /// One shuffled pass.
    pub fn random_finite<R: Rng + ?Sized>(mut self, rng: &mut R) -> std::vec::IntoIter<T> {
        self.items.shuffle(rng);
        self.items.into_iter()
    }
}

impl<T: Clone> ItemSource<T> {
    /// Endless cycle in original order. An empty collection cannot be
    /// cycled, so it is rejected up front.
    pub fn infinite(self) -> Result<Cycle<T>> {
        if self.items.is_empty() {
            return Err(Error::EmptySource(self.name));
        }
        Ok(Cycle {
            items: self.items,
            pos: 0,
        })
    }

    /// Endless sequence of independent shuffles: every item appears exactly
    /// once per cycle. An empty collection yields nothing.
    pub fn random_infinite<R: Rng>(self, rng: R) -> Shuffled<T, R> {
        Shuffled {
            items: self.items,
            pos: 0,
            rng,
        }
    }

    /// Endless sequence in the given order, boxed so callers can mix modes.
    pub fn endless<R>(self, order: Order, rng: R) -> Result<Box<dyn Iterator<Item = T> + Send>>
    where
        T: Send + 'static,
        R: Rng + Send + 'static,
    {
        Ok(match order {
            Order::Sequential => Box::new(self.infinite()?),
            Order::Random => Box::new(self.random_infinite(rng)),
        })
    }
}

impl ItemSource<String> {
    /// Resolve a text path and load it.
    ///
    /// Resolution order: exact file, exact directory, `<path>.d` directory,
    /// `<path>.txt` file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.is_file() {
            return Self::from_file(path);
        }
        if path.is_dir() {
            return Self::from_dir(path);
        }

        let d_path = with_suffix(path, ".d");
        if d_path.is_dir() {
            return Self::from_dir(&d_path);
        }
        let txt_path = with_suffix(path, ".txt");
        if txt_path.is_file() {
            return Self::from_file(&txt_path);
        }

        Err(Error::SourceNotFound {
            kind: SourceKind::Text,
            path: path.to_path_buf(),
        })
    }

    /// Load a newline-delimited file: one trimmed, non-blank line per item.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::SourceNotFound {
                kind: SourceKind::File,
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let items: Vec<String> = text
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        debug!(path = %path.display(), count = items.len(), "loaded line source");
        Ok(Self::from_items(path.display().to_string(), items))
    }

    /// Load a directory: one item per `*.txt` file, trimmed, in file name
    /// order. Blank files are skipped.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::SourceNotFound {
                kind: SourceKind::Directory,
                path: path.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            let is_item = file_path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(DIR_ITEM_SUFFIX));
            if is_item && file_path.is_file() {
                files.push(file_path);
            }
        }
        files.sort();

        let mut items = Vec::with_capacity(files.len());
        for file_path in files {
            let bytes = std::fs::read(&file_path)?;
            let item = String::from_utf8_lossy(&bytes).trim().to_string();
            if !item.is_empty() {
                items.push(item);
            }
        }

        debug!(path = %path.display(), count = items.len(), "loaded directory source");
        Ok(Self::from_items(path.display().to_string(), items))
    }
}

impl ItemSource<Vec<String>> {
    /// Load a CSV table (no header row). Resolution order: exact file,
    /// then `<path>.csv`.
    pub fn open_table(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let resolved = if path.is_file() {
            path.to_path_buf()
        } else {
            with_suffix(path, ".csv")
        };
        if !resolved.is_file() {
            return Err(Error::SourceNotFound {
                kind: SourceKind::Table,
                path: path.to_path_buf(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&resolved)?;

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record?;
            let row: Vec<String> = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();
            rows.push(row);
        }

        debug!(path = %resolved.display(), count = rows.len(), "loaded table source");
        Ok(Self::from_items(resolved.display().to_string(), rows))
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Iterator returned by [`ItemSource::infinite`].
#[derive(Debug, Clone)]
pub struct Cycle<T> {
    items: Vec<T>,
    pos: usize,
}

impl<T: Clone> Iterator for Cycle<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.items.get(self.pos)?.clone();
        self.pos = (self.pos + 1) % self.items.len();
        Some(item)
    }
}

/// Iterator returned by [`ItemSource::random_infinite`].
#[derive(Debug)]
pub struct Shuffled<T, R> {
    items: Vec<T>,
    pos: usize,
    rng: R,
}

impl<T: Clone, R: Rng> Iterator for Shuffled<T, R> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        if self.pos == 0 {
            self.items.shuffle(&mut self.rng);
        }
        let item = self.items[self.pos].clone();
        self.pos = (self.pos + 1) % self.items.len();
        Some(item)
    }
}
