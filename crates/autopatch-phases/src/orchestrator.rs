use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use anyhow::Result;
use autopatch_core::{FailureKind, PhaseKey, PhaseOutcome, PhaseSelection, RunReport, UpdateConfig};
use autopatch_exec::{has_internet, reboot_required, CommandRunner};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::adapter::{PhaseAdapter, PhaseContext};
use crate::maintenance::MaintenancePhase;
use crate::package_manager::PackageManagerPhase;
use crate::store::StorePhase;
use crate::windows_update::WindowsUpdatePhase;

/// Upper bound on phases in flight at once.
pub const MAX_CONCURRENT_PHASES: usize = 2;

/// Consumes a finished run. Implementations decide how it is presented.
pub trait Reporter {
    fn report(&self, report: &RunReport) -> Result<()>;
}

pub fn default_adapters() -> Vec<Box<dyn PhaseAdapter>> {
    vec![
        Box::new(PackageManagerPhase::winget()),
        Box::new(PackageManagerPhase::chocolatey()),
        Box::new(StorePhase::new()),
        Box::new(WindowsUpdatePhase::new()),
        Box::new(MaintenancePhase::health()),
        Box::new(MaintenancePhase::cleanup()),
    ]
}

/// Groups the selection into stages. Phases inside a stage run concurrently;
/// a stage starts only after the previous one has fully completed.
pub fn execution_plan(selection: &PhaseSelection, parallel: bool) -> Vec<Vec<PhaseKey>> {
    let mut stages = Vec::new();
    let group = selection.concurrent_group();
    if parallel {
        stages.extend(group.chunks(MAX_CONCURRENT_PHASES).map(<[PhaseKey]>::to_vec));
    } else {
        stages.extend(group.into_iter().map(|key| vec![key]));
    }
    stages.extend(selection.sequential().into_iter().map(|key| vec![key]));
    stages
}

pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a UpdateConfig,
    adapters: Vec<Box<dyn PhaseAdapter>>,
    log_file: Option<PathBuf>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a UpdateConfig) -> Self {
        Self {
            runner,
            config,
            adapters: default_adapters(),
            log_file: None,
        }
    }

    pub fn with_adapters(mut self, adapters: Vec<Box<dyn PhaseAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn run_and_report(
        &self,
        selection: &PhaseSelection,
        dry_run: bool,
        parallel: bool,
        reporter: &dyn Reporter,
    ) -> Result<RunReport> {
        let report = self.run_all(selection, dry_run, parallel);
        reporter.report(&report)?;
        Ok(report)
    }

    /// Runs every selected phase and always produces a report: phase errors
    /// are folded into Failed outcomes and never cut the run short.
    pub fn run_all(&self, selection: &PhaseSelection, dry_run: bool, parallel: bool) -> RunReport {
        let plan = execution_plan(selection, parallel);
        info!(?plan, dry_run, parallel, "starting update run");

        let mut warnings = Vec::new();
        let online = has_internet(self.runner);
        if !online {
            let prepares_tooling = selection.contains(PhaseKey::WindowsUpdate) && !dry_run;
            let warning = if prepares_tooling {
                "offline: no connectivity endpoint answered; update tooling preparation skipped"
            } else {
                "offline: no connectivity endpoint answered"
            };
            warnings.push(warning.to_string());
        }

        let mut phases = Vec::with_capacity(selection.len());
        for stage in &plan {
            if stage.len() > 1 {
                phases.extend(self.run_concurrent(stage, dry_run, online));
            } else {
                phases.extend(stage.iter().map(|key| self.run_phase(*key, dry_run, online)));
            }
        }

        let reboot = reboot_required(self.runner);
        if let Some(warning) = reboot.warning {
            warnings.push(warning);
        }

        let report = RunReport::new(
            phases,
            reboot.required,
            dry_run,
            warnings,
            self.log_file.clone(),
            Utc::now(),
        );
        info!(
            failed = report.failed().count(),
            changed = report.total_changed(),
            reboot_required = report.reboot_required(),
            "update run finished"
        );
        report
    }

    fn run_concurrent(&self, stage: &[PhaseKey], dry_run: bool, online: bool) -> Vec<PhaseOutcome> {
        let (sender, receiver) = mpsc::channel();
        thread::scope(|scope| {
            for key in stage {
                let sender = sender.clone();
                scope.spawn(move || {
                    let _ = sender.send(self.run_phase(*key, dry_run, online));
                });
            }
        });
        drop(sender);
        receiver.into_iter().collect()
    }

    fn adapter(&self, key: PhaseKey) -> Option<&dyn PhaseAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.key() == key)
            .map(|adapter| adapter.as_ref())
    }

    fn run_phase(&self, key: PhaseKey, dry_run: bool, online: bool) -> PhaseOutcome {
        let Some(adapter) = self.adapter(key) else {
            warn!(phase = %key, "no adapter registered for phase");
            return PhaseOutcome::skipped(key, "no adapter registered");
        };

        let ctx = PhaseContext::new(self.runner, self.config.settings_for(key), dry_run)
            .online(online);
        info!(phase = %key, "phase started");
        let started = Instant::now();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| adapter.run(&ctx))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                error!(phase = %key, error = %format!("{err:#}"), "phase adapter failed");
                PhaseOutcome::failed(
                    key,
                    FailureKind::adapter(format!("{err:#}")),
                    started.elapsed(),
                    "phase aborted",
                )
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(phase = %key, panic = %message, "phase adapter panicked");
                PhaseOutcome::failed(
                    key,
                    FailureKind::adapter(format!("panicked: {message}")),
                    started.elapsed(),
                    "phase aborted",
                )
            }
        };

        info!(
            phase = %key,
            state = %outcome.state(),
            changed = outcome.changed_count(),
            elapsed_ms = u64::try_from(outcome.duration().as_millis()).unwrap_or(u64::MAX),
            detail = outcome.detail(),
            "phase finished"
        );
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
