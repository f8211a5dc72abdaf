use std::time::Duration;

use anyhow::Result;
use autopatch_core::{PhaseKey, PhaseOutcome};
use autopatch_exec::{powershell_args, POWERSHELL};
use tracing::{info, warn};

use crate::adapter::{plural, PhaseAdapter, PhaseClock, PhaseContext};
use crate::counts;

/// OS updates routinely run for an hour or more.
pub const UPDATE_TIMEOUT_FLOOR: Duration = Duration::from_secs(2 * 60 * 60);

const PREPARE_SCRIPTS: [&str; 2] = [
    "Install-PackageProvider -Name NuGet -MinimumVersion 2.8.5.201 -Force",
    "Install-Module -Name PSWindowsUpdate -Force -AllowClobber",
];

const LIST_SCRIPT: &str = "Import-Module PSWindowsUpdate; Get-WindowsUpdate";

// Rebooting is decided after every phase has finished, never here.
const INSTALL_SCRIPT: &str =
    "Import-Module PSWindowsUpdate; Install-WindowsUpdate -AcceptAll -IgnoreReboot";

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsUpdatePhase;

impl WindowsUpdatePhase {
    pub fn new() -> Self {
        Self
    }

    /// Installs the update tooling. Failures are advisory and only logged.
    fn prepare(&self, ctx: &PhaseContext<'_>) {
        if !ctx.online {
            warn!(phase = %PhaseKey::WindowsUpdate, "offline; skipping update tooling preparation");
            return;
        }
        for script in PREPARE_SCRIPTS {
            let request = ctx
                .settings
                .request(POWERSHELL, powershell_args(script))
                .ignore_failure(true)
                .mutating(true);
            if let Err(err) = ctx.execute(&request) {
                warn!(phase = %PhaseKey::WindowsUpdate, error = %err, "preparation step failed");
            }
        }
    }
}

impl PhaseAdapter for WindowsUpdatePhase {
    fn key(&self) -> PhaseKey {
        PhaseKey::WindowsUpdate
    }

    fn run(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutcome> {
        if !ctx.tool_available(POWERSHELL) {
            return Ok(PhaseOutcome::skipped(
                PhaseKey::WindowsUpdate,
                "powershell not available",
            ));
        }

        let clock = PhaseClock::start(PhaseKey::WindowsUpdate);
        let settings = ctx.settings.with_timeout_floor(UPDATE_TIMEOUT_FLOOR);

        if ctx.dry_run {
            let request = settings.request(POWERSHELL, powershell_args(LIST_SCRIPT));
            return Ok(match ctx.execute(&request) {
                Ok(output) => {
                    let pending = counts::windows_updates_listed(&output).unwrap_or(0);
                    clock.succeeded(
                        pending,
                        format!("would install {}", plural(pending, "update")),
                    )
                }
                Err(failure) => clock.failed(failure, "update listing failed"),
            });
        }

        self.prepare(ctx);

        let request = settings
            .request(POWERSHELL, powershell_args(INSTALL_SCRIPT))
            .mutating(true);
        match ctx.execute(&request) {
            Ok(output) => {
                let installed = counts::windows_updates_installed(&output).unwrap_or(0);
                info!(phase = %PhaseKey::WindowsUpdate, installed, "update installation finished");
                let detail = if installed == 0 {
                    "no updates installed".to_string()
                } else {
                    format!("{} installed", plural(installed, "update"))
                };
                Ok(clock.succeeded(installed, detail))
            }
            Err(failure) => Ok(clock.failed(failure, "update installation failed")),
        }
    }
}
