use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::{PhaseKey, PhaseState};
use crate::request::FailureKind;

/// Terminal record of one phase. `failure_reason` is set iff the state is Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PhaseOutcomeRecord")]
pub struct PhaseOutcome {
    name: PhaseKey,
    state: PhaseState,
    changed_count: u64,
    duration: Duration,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<FailureKind>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhaseOutcomeRecord {
    name: PhaseKey,
    state: PhaseState,
    changed_count: u64,
    duration: Duration,
    detail: String,
    #[serde(default)]
    failure_reason: Option<FailureKind>,
}

impl TryFrom<PhaseOutcomeRecord> for PhaseOutcome {
    type Error = anyhow::Error;

    fn try_from(record: PhaseOutcomeRecord) -> Result<Self> {
        let failed = record.state == PhaseState::Failed;
        if failed != record.failure_reason.is_some() {
            return Err(anyhow!(
                "phase '{}' in state '{}' must {} a failure reason",
                record.name,
                record.state,
                if failed { "carry" } else { "not carry" }
            ));
        }
        if record.state == PhaseState::Skipped
            && (record.changed_count != 0 || !record.duration.is_zero())
        {
            return Err(anyhow!(
                "skipped phase '{}' must report zero changes and zero duration",
                record.name
            ));
        }

        Ok(Self {
            name: record.name,
            state: record.state,
            changed_count: record.changed_count,
            duration: record.duration,
            detail: record.detail,
            failure_reason: record.failure_reason,
        })
    }
}

impl PhaseOutcome {
    pub fn skipped(name: PhaseKey, detail: impl Into<String>) -> Self {
        Self {
            name,
            state: PhaseState::Skipped,
            changed_count: 0,
            duration: Duration::ZERO,
            detail: detail.into(),
            failure_reason: None,
        }
    }

    pub fn succeeded(
        name: PhaseKey,
        changed_count: u64,
        duration: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            name,
            state: PhaseState::Succeeded,
            changed_count,
            duration,
            detail: detail.into(),
            failure_reason: None,
        }
    }

    pub fn failed(
        name: PhaseKey,
        reason: FailureKind,
        duration: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            name,
            state: PhaseState::Failed,
            changed_count: 0,
            duration,
            detail: detail.into(),
            failure_reason: Some(reason),
        }
    }

    pub fn name(&self) -> PhaseKey {
        self.name
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn changed_count(&self) -> u64 {
        self.changed_count
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn failure_reason(&self) -> Option<&FailureKind> {
        self.failure_reason.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.state == PhaseState::Failed
    }
}

/// Failure and reboot are independent signals and are never folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    pub any_failed: bool,
    pub reboot_required: bool,
}

impl RunStatus {
    pub const EXIT_PHASE_FAILED: i32 = 2;
    pub const EXIT_REBOOT_REQUIRED: i32 = 4;

    pub fn exit_code(&self) -> i32 {
        let mut code = 0;
        if self.any_failed {
            code |= Self::EXIT_PHASE_FAILED;
        }
        if self.reboot_required {
            code |= Self::EXIT_REBOOT_REQUIRED;
        }
        code
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    log_file: Option<PathBuf>,
    reboot_required: bool,
    dry_run: bool,
    phases: Vec<PhaseOutcome>,
    finished_at: DateTime<Utc>,
    #[serde(default)]
    warnings: Vec<String>,
}

impl RunReport {
    pub fn new(
        phases: Vec<PhaseOutcome>,
        reboot_required: bool,
        dry_run: bool,
        warnings: Vec<String>,
        log_file: Option<PathBuf>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            log_file,
            reboot_required,
            dry_run,
            phases,
            finished_at,
            warnings,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse run report")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize run report")
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run report: {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("failed to parse run report: {}", path.display()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut payload = self.to_json()?;
        payload.push('\n');
        std::fs::write(path, payload)
            .with_context(|| format!("failed to write run report: {}", path.display()))
    }

    pub fn phases(&self) -> &[PhaseOutcome] {
        &self.phases
    }

    pub fn phase(&self, name: PhaseKey) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|outcome| outcome.name() == name)
    }

    pub fn reboot_required(&self) -> bool {
        self.reboot_required
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn failed(&self) -> impl Iterator<Item = &PhaseOutcome> {
        self.phases.iter().filter(|outcome| outcome.is_failed())
    }

    pub fn any_failed(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn total_changed(&self) -> u64 {
        self.phases
            .iter()
            .map(PhaseOutcome::changed_count)
            .fold(0, u64::saturating_add)
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            any_failed: self.any_failed(),
            reboot_required: self.reboot_required,
        }
    }
}
