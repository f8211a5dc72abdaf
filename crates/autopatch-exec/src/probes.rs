use std::time::Duration;

use autopatch_core::{ExecutionRequest, RetryPolicy};
use tracing::{debug, info, warn};

use crate::powershell::{powershell_args, POWERSHELL};
use crate::runner::CommandRunner;

pub const CONNECTIVITY_ENDPOINTS: [&str; 3] = ["1.1.1.1", "8.8.8.8", "www.microsoft.com"];

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const REBOOT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

const REBOOT_PROBE_SCRIPT: &str = concat!(
    "$pending = $false; ",
    "foreach ($key in @(",
    "'HKLM:\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Component Based Servicing\\RebootPending', ",
    "'HKLM:\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\WindowsUpdate\\Auto Update\\RebootRequired'",
    ")) { if (Test-Path $key) { $pending = $true } }; ",
    "$rename = Get-ItemProperty -Path 'HKLM:\\SYSTEM\\CurrentControlSet\\Control\\Session Manager' ",
    "-Name PendingFileRenameOperations -ErrorAction SilentlyContinue; ",
    "if ($rename) { $pending = $true }; ",
    "Write-Output $pending"
);

/// Outcome of the pending-reboot probe. An indeterminate probe reads as
/// "no reboot" and carries a warning for the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootProbe {
    pub required: bool,
    pub warning: Option<String>,
}

pub fn is_tool_available(runner: &dyn CommandRunner, tool: &str) -> bool {
    let available = runner.tool_available(tool);
    debug!(tool, available, "tool lookup");
    available
}

/// Advisory connectivity check. Never fails; any error reads as offline.
pub fn has_internet(runner: &dyn CommandRunner) -> bool {
    for endpoint in CONNECTIVITY_ENDPOINTS {
        let request = ExecutionRequest::new("ping", ping_args(endpoint))
            .timeout(Some(PING_TIMEOUT))
            .retries(1)
            .backoff(RetryPolicy::immediate())
            .ignore_failure(true);
        match runner.execute(&request) {
            Ok(output) if !output.trim().is_empty() => {
                info!(endpoint, "connectivity probe succeeded");
                return true;
            }
            Ok(_) => debug!(endpoint, "connectivity probe learned nothing"),
            Err(err) => debug!(endpoint, error = %err, "connectivity probe failed"),
        }
    }
    warn!("no connectivity endpoint answered; treating machine as offline");
    false
}

fn ping_args(endpoint: &str) -> Vec<String> {
    if cfg!(windows) {
        vec!["-n", "1", "-w", "2000", endpoint]
    } else {
        vec!["-c", "1", "-W", "2", endpoint]
    }
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Checks the platform's pending-reboot indicators once.
pub fn reboot_required(runner: &dyn CommandRunner) -> RebootProbe {
    let request = ExecutionRequest::new(POWERSHELL, powershell_args(REBOOT_PROBE_SCRIPT))
        .timeout(Some(REBOOT_PROBE_TIMEOUT))
        .retries(1)
        .backoff(RetryPolicy::immediate());

    let reading = match runner.execute(&request) {
        Ok(output) => parse_reboot_flag(&output)
            .ok_or_else(|| format!("unrecognized probe output '{}'", output.trim())),
        Err(err) => Err(err.to_string()),
    };

    match reading {
        Ok(required) => {
            info!(required, "pending reboot probe finished");
            RebootProbe {
                required,
                warning: None,
            }
        }
        Err(reason) => {
            warn!(reason = %reason, "pending reboot state is indeterminate; assuming no reboot");
            RebootProbe {
                required: false,
                warning: Some(format!(
                    "could not determine whether a reboot is pending ({reason}); check manually"
                )),
            }
        }
    }
}

pub(crate) fn parse_reboot_flag(output: &str) -> Option<bool> {
    let last = output.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    if last.eq_ignore_ascii_case("true") {
        Some(true)
    } else if last.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

