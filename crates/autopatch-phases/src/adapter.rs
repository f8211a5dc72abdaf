use std::time::Instant;

use anyhow::Result;
use autopatch_core::{ExecutionRequest, FailureKind, PhaseKey, PhaseOutcome, PhaseSettings};
use autopatch_exec::CommandRunner;

/// Everything a phase adapter may use during one run.
#[derive(Clone, Copy)]
pub struct PhaseContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub settings: PhaseSettings,
    pub dry_run: bool,
    pub online: bool,
}

impl<'a> PhaseContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: PhaseSettings, dry_run: bool) -> Self {
        Self {
            runner,
            settings,
            dry_run,
            online: true,
        }
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn tool_available(&self, tool: &str) -> bool {
        autopatch_exec::is_tool_available(self.runner, tool)
    }

    pub fn execute(&self, request: &ExecutionRequest) -> Result<String, FailureKind> {
        self.runner.execute(request)
    }
}

/// One subsystem's update step, normalized to a `PhaseOutcome`.
///
/// `NotStarted -> {Skipped | Running} -> {Succeeded | Failed}`; an adapter
/// returns `Skipped` without touching any mutating command.
pub trait PhaseAdapter: Send + Sync {
    fn key(&self) -> PhaseKey;

    fn run(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutcome>;
}

/// Measures a running phase from its first command.
pub(crate) struct PhaseClock {
    key: PhaseKey,
    started: Instant,
}

impl PhaseClock {
    pub(crate) fn start(key: PhaseKey) -> Self {
        Self {
            key,
            started: Instant::now(),
        }
    }

    pub(crate) fn succeeded(&self, changed_count: u64, detail: impl Into<String>) -> PhaseOutcome {
        PhaseOutcome::succeeded(self.key, changed_count, self.started.elapsed(), detail)
    }

    pub(crate) fn failed(&self, reason: FailureKind, detail: impl Into<String>) -> PhaseOutcome {
        PhaseOutcome::failed(self.key, reason, self.started.elapsed(), detail)
    }
}

pub(crate) fn plural(count: u64, singular: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {singular}s")
    }
}
