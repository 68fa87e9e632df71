//! Command operation: run an external executable once per attempt.
//!
//! The task is written to the child's stdin as JSON. Exit status 0 means
//! success and the trimmed stdout becomes the result; anything else is a
//! failure carrying stderr as its trace.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::model::post::PostTask;
use crate::model::{Failure, Outcome, WorkItem};

use super::Operation;

#[derive(Debug, Clone)]
pub struct CommandOperation {
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Kill the child and fail the attempt after this long.
    pub timeout: Option<Duration>,
}

impl CommandOperation {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run_child(&self, item: &WorkItem<PostTask>, input: Vec<u8>) -> Outcome<String> {
        debug!(
            index = item.index,
            command = %self.command.display(),
            "spawning operation command"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env("BULKPOST_INDEX", item.index.to_string())
            .env("BULKPOST_TASK_ID", item.id.0.to_string())
            .env("BULKPOST_TARGET", item.payload.target())
            .env("BULKPOST_RETRY", item.retries().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Failure::new("spawn", format!("{}: {e}", self.command.display())))?;

        // Stdin is fed while stdout and stderr are drained, so a child that
        // writes before it has read all of its input cannot stall on a full
        // pipe.
        let stdin = child.stdin.take();
        let index = item.index;
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A child that ignores its input may close the pipe early;
                // its exit status decides the outcome either way.
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(index, "operation stdin closed early: {e}");
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| Failure::new("io", e.to_string()))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = match stderr.lines().last() {
            Some(last) => format!("exited with status {code}: {last}"),
            None => format!("exited with status {code}"),
        };
        Err(Failure::new("exit", message).with_trace(stderr))
    }
}

#[async_trait]
impl Operation for CommandOperation {
    type Payload = PostTask;
    type Output = String;

    async fn execute(&self, item: &WorkItem<PostTask>) -> Outcome<String> {
        let input = serde_json::to_vec(&item.payload.to_operation_json())
            .map_err(|e| Failure::new("encode", e.to_string()))?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_child(item, input))
                .await
                .map_err(|_| Failure::new("timeout", format!("no result after {limit:?}")))?,
            None => self.run_child(item, input).await,
        }
    }
}
