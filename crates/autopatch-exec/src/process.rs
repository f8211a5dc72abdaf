use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use autopatch_core::{ExecutionRequest, FailureKind};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a single process run that exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub success: bool,
}

impl AttemptOutput {
    pub fn into_result(self) -> Result<String, FailureKind> {
        if self.success {
            return Ok(self.stdout);
        }
        let diagnostics = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        Err(FailureKind::command_failure(self.exit_status, diagnostics))
    }
}

/// Runs the request's command once, honoring its timeout. No retries here.
///
/// The timeout covers both the process exit and draining its output, so a
/// background grandchild holding the pipes open cannot stall the run.
pub fn run_once(request: &ExecutionRequest) -> Result<String, FailureKind> {
    let timed_out = || FailureKind::timeout(request.timeout_limit().unwrap_or_default());
    let mut command = Command::new(request.program());
    command
        .args(request.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|err| {
        FailureKind::command_failure(
            None,
            &format!("failed to launch {}: {err}", request.program()),
        )
    })?;
    let deadline = request
        .timeout_limit()
        .and_then(|limit| Instant::now().checked_add(limit));

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            // Reader threads are left detached: grandchildren may still hold the pipes.
            return Err(timed_out());
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FailureKind::command_failure(
                None,
                &format!("failed waiting for {}: {err}", request.program()),
            ));
        }
    };

    let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
    else {
        return Err(timed_out());
    };

    AttemptOutput {
        stdout,
        stderr,
        exit_status: status.code(),
        success: status.success(),
    }
    .into_result()
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(remaining));
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    let mut pipe = pipe?;
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        let _ = sender.send(String::from_utf8_lossy(&buffer).into_owned());
    });
    Some(receiver)
}

/// `None` when the pipe is still open at the deadline.
fn collect(pipe: Option<Receiver<String>>, deadline: Option<Instant>) -> Option<String> {
    let Some(receiver) = pipe else {
        return Some(String::new());
    };
    let Some(deadline) = deadline else {
        return Some(receiver.recv().unwrap_or_default());
    };
    match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}
