use anyhow::Result;
use autopatch_core::{PhaseKey, PhaseOutcome};
use autopatch_exec::{powershell_args, POWERSHELL};
use tracing::warn;

use crate::adapter::{PhaseAdapter, PhaseClock, PhaseContext};

const STORE_SCAN_SCRIPT: &str = concat!(
    "Get-CimInstance -Namespace 'Root\\cimv2\\mdm\\dmmap' ",
    "-ClassName 'MDM_EnterpriseModernAppManagement_AppManagement01' ",
    "| Invoke-CimMethod -MethodName UpdateScanMethod"
);

/// Triggers the app-store update scan. Store mechanisms differ between OS
/// releases, so every step is best-effort and the phase never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorePhase;

impl StorePhase {
    pub fn new() -> Self {
        Self
    }
}

impl PhaseAdapter for StorePhase {
    fn key(&self) -> PhaseKey {
        PhaseKey::Store
    }

    fn run(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutcome> {
        if ctx.dry_run {
            return Ok(PhaseOutcome::skipped(
                PhaseKey::Store,
                "dry run: store update scan is not previewable",
            ));
        }
        if !ctx.tool_available(POWERSHELL) {
            return Ok(PhaseOutcome::skipped(
                PhaseKey::Store,
                "powershell not available",
            ));
        }

        let clock = PhaseClock::start(PhaseKey::Store);
        let request = ctx
            .settings
            .request(POWERSHELL, powershell_args(STORE_SCAN_SCRIPT))
            .ignore_failure(true)
            .mutating(true);
        match ctx.execute(&request) {
            Ok(output) if output.trim().is_empty() => {
                Ok(clock.succeeded(0, "update scan requested (no confirmation)"))
            }
            Ok(_) => Ok(clock.succeeded(0, "update scan triggered")),
            Err(err) => {
                warn!(phase = %PhaseKey::Store, error = %err, "store update unavailable");
                Ok(PhaseOutcome::skipped(PhaseKey::Store, "store update unavailable"))
            }
        }
    }
}
