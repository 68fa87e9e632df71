//! Run configuration.
//!
//! A run is described by one TOML file. Relative paths inside it are
//! resolved against the directory the file lives in, so a config and its
//! inputs can be moved around together. Process-level settings (telemetry
//! endpoint, log level) come from the environment instead.

pub mod secrets;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{DEFAULT_CONCURRENCY, DispatchConfig};
use crate::error::{Error, Result};
use crate::factory::{
    AccountFormat, DEFAULT_TAGS_MEAN, DEFAULT_TAGS_STD_DEV, FIRST_LINE_TITLES, TaskFactory,
};
use crate::operation::{CommandOperation, DryRunOperation, PostOperation};
use crate::output::OutputSink;
use crate::source::{ItemSource, Order};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Settings read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub otel_endpoint: Option<String>,
    pub log_level: Option<String>,
}

impl Environment {
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Self {
        Self {
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL"),
        }
    }
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Run file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Seconds between task starts on one lane.
    pub delay: Option<f64>,
    /// Seconds between a failed task's start and the lane's next task.
    pub error_delay: Option<f64>,
    #[serde(default)]
    pub retry_limit: u32,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            delay: None,
            error_delay: None,
            retry_limit: 0,
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TasksSection {
    pub accounts: PathBuf,
    pub account_format: String,
    pub count: usize,
    /// Path to a title source, or `__use_first_line__`.
    pub titles: Option<String>,
    pub content: PathBuf,
    pub tags: Option<PathBuf>,
    #[serde(default = "default_tags_mean")]
    pub tags_mean: f64,
    #[serde(default = "default_tags_std_dev")]
    pub tags_std_dev: f64,
    #[serde(default)]
    pub order: Order,
    pub user_agent: Option<String>,
    /// Fixes shuffles and tag counts; mostly useful with `preview`.
    pub seed: Option<u64>,
}

fn default_tags_mean() -> f64 {
    DEFAULT_TAGS_MEAN
}

fn default_tags_std_dev() -> f64 {
    DEFAULT_TAGS_STD_DEV
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum OperationSection {
    /// Run an executable per task. A bare name is looked up on `PATH`; a
    /// path with a separator is resolved like every other path.
    Command {
        command: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        /// Seconds before the child is killed.
        timeout: Option<f64>,
    },
    DryRun,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// Base name of the output files. No files are written when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub dispatch: DispatchSection,
    pub tasks: TasksSection,
    pub operation: OperationSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir)
    }

    /// Parse a config whose relative paths are anchored at `base_dir`.
    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: RunConfig = toml::from_str(text)?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dispatch.concurrency == 0 {
            return Err(Error::Config("dispatch.concurrency must be at least 1".into()));
        }
        seconds("dispatch.delay", self.dispatch.delay)?;
        seconds("dispatch.error_delay", self.dispatch.error_delay)?;
        if let OperationSection::Command { timeout, .. } = &self.operation {
            seconds("operation.timeout", *timeout)?;
        }
        if !self.tasks.tags_mean.is_finite() {
            return Err(Error::Config("tasks.tags_mean must be a finite number".into()));
        }
        if !(self.tasks.tags_std_dev.is_finite() && self.tasks.tags_std_dev >= 0.0) {
            return Err(Error::Config(
                "tasks.tags_std_dev must be a non-negative number".into(),
            ));
        }
        self.account_format()?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Anchor a relative path at the config file's directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn account_format(&self) -> Result<AccountFormat> {
        self.tasks.account_format.parse()
    }

    pub fn dispatch_config(&self) -> Result<DispatchConfig> {
        Ok(DispatchConfig {
            concurrency: self.dispatch.concurrency,
            delay: seconds("dispatch.delay", self.dispatch.delay)?,
            error_delay: seconds("dispatch.error_delay", self.dispatch.error_delay)?,
            retry_limit: self.dispatch.retry_limit,
        })
    }

    /// Load every input source and build the task sequence.
    pub fn task_factory(&self) -> Result<TaskFactory> {
        let tasks = &self.tasks;
        let accounts = self
            .account_format()?
            .load_accounts(&self.resolve(&tasks.accounts))?;
        let content = ItemSource::open(self.resolve(&tasks.content))?;

        let mut builder = TaskFactory::builder(accounts, content, tasks.count).order(tasks.order);
        builder = match tasks.titles.as_deref() {
            Some(FIRST_LINE_TITLES) => builder.first_line_titles(),
            Some(path) => builder.titles(ItemSource::open(self.resolve(path))?),
            None => builder,
        };
        if let Some(tags) = &tasks.tags {
            builder = builder.tags(
                ItemSource::open(self.resolve(tags))?,
                tasks.tags_mean,
                tasks.tags_std_dev,
            );
        }
        if let Some(user_agent) = &tasks.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(seed) = tasks.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    pub fn operation(&self) -> Result<PostOperation> {
        match &self.operation {
            OperationSection::Command {
                command,
                args,
                timeout,
            } => {
                let command = if command.components().count() > 1 {
                    self.resolve(command)
                } else {
                    command.clone()
                };
                let mut op = CommandOperation::new(command).args(args.iter().cloned());
                if let Some(limit) = seconds("operation.timeout", *timeout)? {
                    op = op.timeout(limit);
                }
                Ok(PostOperation::Command(op))
            }
            OperationSection::DryRun => Ok(PostOperation::DryRun(DryRunOperation)),
        }
    }

    /// The output files for this run, if an output path is configured.
    pub fn output_sink(&self) -> Option<OutputSink> {
        self.output
            .path
            .as_ref()
            .map(|path| OutputSink::new(self.resolve(path)))
    }
}

fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::Config(format!("{field} must be a non-negative number of seconds, got {secs}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [tasks]
        accounts = "accs"
        account_format = "lj-0"
        count = 3
        content = "content"

        [operation]
        kind = "dry-run"
    "#;

    #[test]
    fn defaults_apply() {
        let config = RunConfig::parse(MINIMAL, "/cfg").unwrap();
        let dispatch = config.dispatch_config().unwrap();
        assert_eq!(dispatch, DispatchConfig::default());
        assert_eq!(config.tasks.order, Order::Random);
        assert_eq!(config.tasks.tags_mean, DEFAULT_TAGS_MEAN);
        assert!(config.output_sink().is_none());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = RunConfig::parse(MINIMAL, "/cfg").unwrap();
        assert_eq!(config.resolve("accs"), PathBuf::from("/cfg/accs"));
        assert_eq!(config.resolve("/abs/accs"), PathBuf::from("/abs/accs"));
    }

    #[test]
    fn dispatch_seconds_become_durations() {
        let text = format!(
            "{MINIMAL}\n[dispatch]\nconcurrency = 4\ndelay = 1.5\nerror_delay = 2\nretry_limit = 3\n"
        );
        let dispatch = RunConfig::parse(&text, "/cfg").unwrap().dispatch_config().unwrap();
        assert_eq!(dispatch.concurrency, 4);
        assert_eq!(dispatch.delay, Some(Duration::from_millis(1500)));
        assert_eq!(dispatch.error_delay, Some(Duration::from_secs(2)));
        assert_eq!(dispatch.retry_limit, 3);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for extra in [
            "[dispatch]\nconcurrency = 0\n",
            "[dispatch]\ndelay = -1.0\n",
            "[dispatch]\nerror_delay = nan\n",
        ] {
            let text = format!("{MINIMAL}\n{extra}");
            assert!(
                matches!(RunConfig::parse(&text, "/cfg"), Err(Error::Config(_))),
                "accepted {extra:?}"
            );
        }
    }

    #[test]
    fn unknown_account_format_is_rejected() {
        let text = MINIMAL.replace("lj-0", "myspace");
        assert!(matches!(
            RunConfig::parse(&text, "/cfg"),
            Err(Error::UnknownAccountFormat(_))
        ));
    }

    #[test]
    fn command_operation_paths() {
        let text = MINIMAL.replace(
            "kind = \"dry-run\"",
            "kind = \"command\"\ncommand = \"bin/post.sh\"\nargs = [\"--fast\"]\ntimeout = 30",
        );
        let config = RunConfig::parse(&text, "/cfg").unwrap();
        match config.operation().unwrap() {
            PostOperation::Command(op) => {
                assert_eq!(op.command, PathBuf::from("/cfg/bin/post.sh"));
                assert_eq!(op.args, vec!["--fast".to_string()]);
                assert_eq!(op.timeout, Some(Duration::from_secs(30)));
            }
            other => panic!("expected command operation, got {other:?}"),
        }

        let bare = text.replace("bin/post.sh", "poster");
        match RunConfig::parse(&bare, "/cfg").unwrap().operation().unwrap() {
            PostOperation::Command(op) => assert_eq!(op.command, PathBuf::from("poster")),
            other => panic!("expected command operation, got {other:?}"),
        }
    }
}
