use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

const STDERR_EXCERPT_CHARS: usize = 512;

/// One external command invocation plus the policy the runner applies to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    retries: u32,
    backoff: RetryPolicy,
    ignore_failure: bool,
    mutating: bool,
}

impl ExecutionRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
            retries: 1,
            backoff: RetryPolicy::default(),
            ignore_failure: false,
            mutating: false,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry count is clamped to at least one attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn ignore_failure(mut self, ignore_failure: bool) -> Self {
        self.ignore_failure = ignore_failure;
        self
    }

    /// Marks a write-class command. Dry runs must never issue one.
    pub fn mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout_limit(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries
    }

    pub fn backoff_policy(&self) -> RetryPolicy {
        self.backoff
    }

    pub fn ignores_failure(&self) -> bool {
        self.ignore_failure
    }

    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureKind {
    #[error("command failed (exit status {}): {stderr_excerpt}", format_exit_status(.exit_status))]
    #[serde(rename_all = "camelCase")]
    CommandFailure {
        exit_status: Option<i32>,
        stderr_excerpt: String,
    },
    #[error("command timed out after {timeout_ms} ms")]
    #[serde(rename_all = "camelCase")]
    Timeout { timeout_ms: u64 },
    #[error("phase adapter error: {message}")]
    Adapter { message: String },
}

impl FailureKind {
    pub fn command_failure(exit_status: Option<i32>, stderr: &str) -> Self {
        Self::CommandFailure {
            exit_status,
            stderr_excerpt: excerpt(stderr),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn format_exit_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Keeps the tail of stderr, where tools usually print the actual error.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect();
    format!("...{tail}")
}
