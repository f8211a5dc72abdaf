use anyhow::Result;
use autopatch_core::{PhaseKey, PhaseOutcome};
use tracing::{info, warn};

use crate::adapter::{plural, PhaseAdapter, PhaseClock, PhaseContext};
use crate::counts;

struct PackageManagerProfile {
    key: PhaseKey,
    tool: &'static str,
    check_args: &'static [&'static str],
    upgrade_args: &'static [&'static str],
    count_available: fn(&str) -> Option<u64>,
    count_upgraded: fn(&str) -> Option<u64>,
}

const WINGET: PackageManagerProfile = PackageManagerProfile {
    key: PhaseKey::Winget,
    tool: "winget",
    check_args: &[
        "upgrade",
        "--include-unknown",
        "--accept-source-agreements",
    ],
    upgrade_args: &[
        "upgrade",
        "--all",
        "--include-unknown",
        "--silent",
        "--accept-source-agreements",
        "--accept-package-agreements",
    ],
    count_available: counts::winget_available,
    count_upgraded: counts::winget_upgraded,
};

const CHOCOLATEY: PackageManagerProfile = PackageManagerProfile {
    key: PhaseKey::Chocolatey,
    tool: "choco",
    check_args: &["outdated"],
    upgrade_args: &["upgrade", "all", "-y", "--no-progress"],
    count_available: counts::choco_outdated,
    count_upgraded: counts::choco_upgraded,
};

/// Upgrade-everything phase for a package manager CLI.
///
/// A read-only pre-check counts pending upgrades first; a count of zero
/// short-circuits before the mutating upgrade command is ever issued.
pub struct PackageManagerPhase {
    profile: PackageManagerProfile,
}

impl PackageManagerPhase {
    pub fn winget() -> Self {
        Self { profile: WINGET }
    }

    pub fn chocolatey() -> Self {
        Self {
            profile: CHOCOLATEY,
        }
    }

    pub fn tool(&self) -> &'static str {
        self.profile.tool
    }

    fn available_upgrades(&self, ctx: &PhaseContext<'_>) -> Option<u64> {
        let profile = &self.profile;
        let request = ctx
            .settings
            .request(profile.tool, profile.check_args.iter().copied())
            .ignore_failure(true);
        match ctx.execute(&request) {
            Ok(output) => (profile.count_available)(&output),
            Err(err) => {
                warn!(phase = %profile.key, error = %err, "upgrade pre-check failed");
                None
            }
        }
    }
}

impl PhaseAdapter for PackageManagerPhase {
    fn key(&self) -> PhaseKey {
        self.profile.key
    }

    fn run(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutcome> {
        let profile = &self.profile;
        if !ctx.tool_available(profile.tool) {
            info!(phase = %profile.key, tool = profile.tool, "tool not installed; skipping");
            return Ok(PhaseOutcome::skipped(profile.key, "not installed"));
        }

        let clock = PhaseClock::start(profile.key);
        let available = self.available_upgrades(ctx);
        info!(phase = %profile.key, available = ?available, "upgrade pre-check finished");

        if ctx.dry_run {
            return Ok(match available {
                Some(count) => clock.succeeded(count, format!("would upgrade {count}")),
                None => clock.succeeded(0, "upgrade count unavailable"),
            });
        }

        if available == Some(0) {
            return Ok(clock.succeeded(0, "already up to date"));
        }

        let request = ctx
            .settings
            .request(profile.tool, profile.upgrade_args.iter().copied())
            .mutating(true);
        match ctx.execute(&request) {
            Ok(output) => {
                let changed = (profile.count_upgraded)(&output)
                    .or(available)
                    .unwrap_or(0);
                Ok(clock.succeeded(
                    changed,
                    format!("{} upgraded", plural(changed, "package")),
                ))
            }
            Err(failure) => Ok(clock.failed(failure, "upgrade failed")),
        }
    }
}
