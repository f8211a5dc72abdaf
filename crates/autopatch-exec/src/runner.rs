use std::thread;
use std::time::{Duration, Instant};

use autopatch_core::{ExecutionRequest, FailureKind};
use tracing::{info, warn};

use crate::process::run_once;

/// The single process boundary every phase goes through.
pub trait CommandRunner: Send + Sync {
    /// Runs the request with its retry/timeout policy. With `ignore_failure`
    /// set, an exhausted request yields empty output instead of an error.
    fn execute(&self, request: &ExecutionRequest) -> Result<String, FailureKind>;

    /// True when `tool` resolves on the executable search path.
    fn tool_available(&self, tool: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    fn execute(&self, request: &ExecutionRequest) -> Result<String, FailureKind> {
        execute_with_retries(request, run_once, thread::sleep)
    }

    fn tool_available(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }
}

/// Drives `attempt` up to `request.max_attempts()` times, sleeping per the
/// request's backoff policy between failures. Every attempt is logged.
pub fn execute_with_retries<A, S>(
    request: &ExecutionRequest,
    mut attempt: A,
    mut sleep: S,
) -> Result<String, FailureKind>
where
    A: FnMut(&ExecutionRequest) -> Result<String, FailureKind>,
    S: FnMut(Duration),
{
    let command = request.command_line();
    let max_attempts = request.max_attempts();
    let policy = request.backoff_policy();
    let mut last_failure = None;

    for attempt_number in 1..=max_attempts {
        let started = Instant::now();
        let result = attempt(request);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(output) => {
                info!(
                    command = %command,
                    attempt = attempt_number,
                    max_attempts,
                    elapsed_ms,
                    outcome = "success",
                    "command attempt finished"
                );
                return Ok(output);
            }
            Err(failure) => {
                warn!(
                    command = %command,
                    attempt = attempt_number,
                    max_attempts,
                    elapsed_ms,
                    outcome = if failure.is_timeout() { "timeout" } else { "failure" },
                    error = %failure,
                    "command attempt finished"
                );
                if attempt_number < max_attempts {
                    let delay = policy.delay_after(attempt_number);
                    if !delay.is_zero() {
                        sleep(delay);
                    }
                }
                last_failure = Some(failure);
            }
        }
    }

    let failure = last_failure
        .unwrap_or_else(|| FailureKind::command_failure(None, "command was never attempted"));
    if request.ignores_failure() {
        warn!(
            command = %command,
            error = %failure,
            "advisory command failed after {max_attempts} attempt(s); continuing with empty output"
        );
        return Ok(String::new());
    }
    Err(failure)
}
