use std::time::Duration;

use anyhow::Result;
use autopatch_core::{PhaseKey, PhaseOutcome};
use tracing::info;

use crate::adapter::{PhaseAdapter, PhaseClock, PhaseContext};

/// Image repair and component cleanup can take hours on slow disks.
pub const MAINTENANCE_TIMEOUT_FLOOR: Duration = Duration::from_secs(4 * 60 * 60);

const DISM: &str = "dism";

/// Opt-in servicing phase backed by one long-running DISM command.
///
/// Always a single attempt: re-running a partially completed repair can
/// itself damage the component store.
pub struct MaintenancePhase {
    key: PhaseKey,
    args: &'static [&'static str],
    label: &'static str,
}

impl MaintenancePhase {
    pub fn health() -> Self {
        Self {
            key: PhaseKey::Health,
            args: &["/Online", "/Cleanup-Image", "/RestoreHealth"],
            label: "component store repair",
        }
    }

    pub fn cleanup() -> Self {
        Self {
            key: PhaseKey::Cleanup,
            args: &["/Online", "/Cleanup-Image", "/StartComponentCleanup"],
            label: "component cleanup",
        }
    }
}

impl PhaseAdapter for MaintenancePhase {
    fn key(&self) -> PhaseKey {
        self.key
    }

    fn run(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutcome> {
        if ctx.dry_run {
            return Ok(PhaseOutcome::skipped(
                self.key,
                format!("dry run: would run {}", self.label),
            ));
        }
        if !ctx.tool_available(DISM) {
            return Ok(PhaseOutcome::skipped(self.key, "dism not available"));
        }

        let clock = PhaseClock::start(self.key);
        let request = ctx
            .settings
            .with_timeout_floor(MAINTENANCE_TIMEOUT_FLOOR)
            .single_attempt()
            .request(DISM, self.args.iter().copied())
            .mutating(true);
        match ctx.execute(&request) {
            Ok(_) => {
                info!(phase = %self.key, "{} finished", self.label);
                Ok(clock.succeeded(0, format!("{} completed", self.label)))
            }
            Err(failure) => Ok(clock.failed(failure, format!("{} failed", self.label))),
        }
    }
}
