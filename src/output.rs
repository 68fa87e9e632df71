//! Run output files.
//!
//! One base path fans out into several files that differ only in their
//! extension:
//!
//! | file            | contents                                       |
//! |-----------------|------------------------------------------------|
//! | `<base>.txt`    | one line per successful result                 |
//! | `<base>.log`    | begin / result / error / dead lines, then `done!` |
//! | `<base>.err.log`| error and dead lines only                      |
//! | `<base>.accs.csv` | input row of every account that posted once  |
//!
//! Files are created on first write. A file that already exists is kept by
//! renaming it to `last-<n>.<name>` first.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::engine::RunSummary;
use crate::error::Result;
use crate::model::post::PostTask;
use crate::model::{Failure, Outcome, WorkItem};
use crate::report::Reporter;

pub const RESULT_EXT: &str = "txt";
pub const LOG_EXT: &str = "log";
pub const ERROR_LOG_EXT: &str = "err.log";
pub const ACCOUNTS_EXT: &str = "accs.csv";

/// Append `.txt` unless the path already ends with it.
fn normalize(base: PathBuf) -> PathBuf {
    let suffix = format!(".{RESULT_EXT}");
    if base.as_os_str().to_string_lossy().ends_with(&suffix) {
        base
    } else {
        let mut s = base.into_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }
}

/// Swap the `.txt` of a normalized base for `ext` (which may itself
/// contain dots, as in `err.log`).
fn with_ext(base: &Path, ext: &str) -> PathBuf {
    let base = base.as_os_str().to_string_lossy();
    let stem = base.strip_suffix(&format!(".{RESULT_EXT}")).unwrap_or(&base);
    PathBuf::from(format!("{stem}.{ext}"))
}

/// Move an existing file out of the way as `last-<n>.<name>`, using the
/// smallest `n` that is free.
fn rename_to_last(path: &Path) -> Result<PathBuf> {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("last-{n}.{name}"));
        if !candidate.exists() {
            std::fs::rename(path, &candidate)?;
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Create `path` for writing, preserving any previous file under a
/// `last-<n>.` name.
pub fn create_file(path: &Path) -> Result<File> {
    if path.exists() {
        let moved = rename_to_last(path)?;
        debug!(from = %path.display(), to = %moved.display(), "kept previous output");
    }
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    Ok(file)
}

struct Files {
    open: HashMap<&'static str, File>,
    accounts: Option<csv::Writer<File>>,
    /// Account rows already written during this run.
    seen_rows: HashSet<Vec<String>>,
}

/// Writes run results to disk. Implements [`Reporter`] so it can be handed
/// straight to the dispatcher.
pub struct OutputSink {
    base: PathBuf,
    files: Mutex<Files>,
}

impl OutputSink {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: normalize(base.into()),
            files: Mutex::new(Files {
                open: HashMap::new(),
                accounts: None,
                seen_rows: HashSet::new(),
            }),
        }
    }

    /// Where lines for `ext` go.
    pub fn path_for(&self, ext: &str) -> PathBuf {
        if ext == RESULT_EXT {
            self.base.clone()
        } else {
            with_ext(&self.base, ext)
        }
    }

    /// Append one line to the file for `ext`.
    pub fn write_line(&self, ext: &'static str, line: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if !files.open.contains_key(ext) {
            let file = create_file(&self.path_for(ext))?;
            files.open.insert(ext, file);
        }
        if let Some(file) = files.open.get_mut(ext) {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Record an account row as having posted. Returns `false` if the row
    /// was already recorded this run.
    pub fn write_account(&self, row: &[String]) -> Result<bool> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if files.seen_rows.contains(row) {
            return Ok(false);
        }
        if files.accounts.is_none() {
            let file = create_file(&self.path_for(ACCOUNTS_EXT))?;
            files.accounts = Some(csv::Writer::from_writer(file));
        }
        if let Some(writer) = files.accounts.as_mut() {
            writer.write_record(row)?;
            writer.flush()?;
        }
        files.seen_rows.insert(row.to_vec());
        Ok(true)
    }

    fn log(&self, ext: &'static str, line: &str) {
        if let Err(e) = self.write_line(ext, line) {
            warn!(file = %self.path_for(ext).display(), "cannot write output: {e}");
        }
    }
}

fn prefix(item: &WorkItem<PostTask>) -> String {
    format!("[{}] {:?}", item.index, item.payload.target())
}

impl Reporter<PostTask, String> for OutputSink {
    fn task_started(&self, item: &WorkItem<PostTask>) {
        self.log(LOG_EXT, &format!("{}: begin", prefix(item)));
    }

    fn task_finished(&self, item: &WorkItem<PostTask>, outcome: &Outcome<String>) {
        match outcome {
            Ok(result) => {
                self.log(RESULT_EXT, result);
                self.log(LOG_EXT, &format!("{}: result: {result:?}", prefix(item)));
                if let Err(e) = self.write_account(&item.payload.account.raw_row) {
                    warn!(
                        file = %self.path_for(ACCOUNTS_EXT).display(),
                        "cannot write account row: {e}"
                    );
                }
            }
            Err(Failure { kind, message, .. }) => {
                let line = format!("{}: error: {kind:?}: {message}", prefix(item));
                self.log(LOG_EXT, &line);
                self.log(ERROR_LOG_EXT, &line);
            }
        }
    }

    fn task_dead(&self, item: &WorkItem<PostTask>, failure: &Failure) {
        let line = format!(
            "{}: dead after {} attempt(s): {:?}: {}",
            prefix(item),
            item.retries() + 1,
            failure.kind,
            failure.message
        );
        self.log(LOG_EXT, &line);
        self.log(ERROR_LOG_EXT, &line);
    }

    fn run_completed(&self, _summary: &RunSummary) {
        self.log(LOG_EXT, "done!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_gets_txt_extension_once() {
        assert_eq!(normalize("out/run".into()), PathBuf::from("out/run.txt"));
        assert_eq!(normalize("out/run.txt".into()), PathBuf::from("out/run.txt"));
    }

    #[test]
    fn sibling_files_swap_the_last_extension() {
        let sink = OutputSink::new("out/run");
        assert_eq!(sink.path_for(RESULT_EXT), PathBuf::from("out/run.txt"));
        assert_eq!(sink.path_for(LOG_EXT), PathBuf::from("out/run.log"));
        assert_eq!(sink.path_for(ERROR_LOG_EXT), PathBuf::from("out/run.err.log"));
        assert_eq!(sink.path_for(ACCOUNTS_EXT), PathBuf::from("out/run.accs.csv"));

        let dotted = OutputSink::new("out/news.2012");
        assert_eq!(dotted.path_for(LOG_EXT), PathBuf::from("out/news.2012.log"));
    }
}
