use super::*;
use crate::counts;
use anyhow::anyhow;
use autopatch_core::{
    ExecutionRequest, FailureKind, PhaseKey, PhaseOutcome, PhaseSelection, PhaseSettings,
    PhaseState, RetryPolicy, RunReport, UpdateConfig,
};
use autopatch_exec::{execute_with_retries, CommandRunner};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct RecordedAttempt {
    command: String,
    mutating: bool,
    ignore_failure: bool,
    max_attempts: u32,
    timeout: Option<Duration>,
    in_flight: usize,
}

/// In-memory host: scripted results keyed by a command-line fragment, the
/// real retry loop without sleeping, and an in-flight gauge.
struct FakeRunner {
    tools: Vec<&'static str>,
    scripts: Mutex<BTreeMap<&'static str, VecDeque<Result<String, FailureKind>>>>,
    attempts: Mutex<Vec<RecordedAttempt>>,
    attempt_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRunner {
    fn windows_host() -> Self {
        let runner = Self {
            tools: vec!["winget", "choco", "powershell", "dism"],
            scripts: Mutex::new(BTreeMap::new()),
            attempts: Mutex::new(Vec::new()),
            attempt_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        };
        runner.script("ping", vec![Ok("Reply from 1.1.1.1: bytes=32 time=9ms".to_string())]);
        runner.script("RebootPending", vec![Ok("False".to_string())]);
        runner
    }

    fn without_tool(mut self, tool: &str) -> Self {
        self.tools.retain(|candidate| *candidate != tool);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.attempt_delay = delay;
        self
    }

    /// Results are consumed in order; the last one repeats.
    fn script(&self, fragment: &'static str, results: Vec<Result<String, FailureKind>>) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(fragment, results.into());
    }

    fn attempts(&self) -> Vec<RecordedAttempt> {
        self.attempts.lock().expect("attempts lock").clone()
    }

    fn count(&self, fragment: &str) -> usize {
        self.attempts()
            .iter()
            .filter(|attempt| attempt.command.contains(fragment))
            .count()
    }

    fn attempt(&self, request: &ExecutionRequest) -> Result<String, FailureKind> {
        let command = request.command_line();
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.attempts
            .lock()
            .expect("attempts lock")
            .push(RecordedAttempt {
                command: command.clone(),
                mutating: request.is_mutating(),
                ignore_failure: request.ignores_failure(),
                max_attempts: request.max_attempts(),
                timeout: request.timeout_limit(),
                in_flight,
            });
        if !self.attempt_delay.is_zero() {
            std::thread::sleep(self.attempt_delay);
        }

        let result = {
            let mut scripts = self.scripts.lock().expect("scripts lock");
            scripts
                .iter_mut()
                .find(|(fragment, _)| command.contains(*fragment))
                .and_then(|(_, queue)| {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
                .unwrap_or_else(|| Ok(String::new()))
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl CommandRunner for FakeRunner {
    fn execute(&self, request: &ExecutionRequest) -> Result<String, FailureKind> {
        execute_with_retries(request, |request| self.attempt(request), |_| {})
    }

    fn tool_available(&self, tool: &str) -> bool {
        self.tools.contains(&tool)
    }
}

fn settings(retries: u32) -> PhaseSettings {
    PhaseSettings {
        timeout: Some(Duration::from_secs(600)),
        retries,
        backoff: RetryPolicy::immediate(),
    }
}

fn run_adapter(adapter: &dyn PhaseAdapter, runner: &FakeRunner, dry_run: bool) -> PhaseOutcome {
    let ctx = PhaseContext::new(runner, settings(2), dry_run);
    adapter.run(&ctx).expect("adapter must not error")
}

fn command_failure() -> Result<String, FailureKind> {
    Err(FailureKind::command_failure(Some(1), "The operation failed"))
}

const CHOCO_THREE_OUTDATED: &str = "Outdated Packages\n git|2.44.0|2.45.1|false\n 7zip|23.1.0|24.8.0|false\n nodejs|20.11.0|20.15.0|false\n\nChocolatey has determined 3 package(s) are outdated.";
const CHOCO_NONE_OUTDATED: &str = "Outdated Packages\n\nChocolatey has determined 0 package(s) are outdated.";

#[test]
fn chocolatey_absent_is_skipped_not_installed() {
    let runner = FakeRunner::windows_host().without_tool("choco");
    let outcome = run_adapter(&PackageManagerPhase::chocolatey(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Skipped);
    assert_eq!(outcome.changed_count(), 0);
    assert_eq!(outcome.detail(), "not installed");
    assert_eq!(runner.count("choco"), 0, "absent tool must not be invoked");
}

#[test]
fn zero_upgrades_short_circuits_before_mutating_command() {
    let runner = FakeRunner::windows_host();
    runner.script("choco outdated", vec![Ok(CHOCO_NONE_OUTDATED.to_string())]);
    let outcome = run_adapter(&PackageManagerPhase::chocolatey(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.changed_count(), 0);
    assert_eq!(runner.count("choco upgrade"), 0);
    assert_eq!(runner.count("choco outdated"), 1);
}

#[test]
fn second_run_after_upgrade_short_circuits() {
    let runner = FakeRunner::windows_host();
    runner.script(
        "choco outdated",
        vec![
            Ok(CHOCO_THREE_OUTDATED.to_string()),
            Ok(CHOCO_NONE_OUTDATED.to_string()),
        ],
    );
    runner.script(
        "choco upgrade",
        vec![Ok("Chocolatey upgraded 3/3 packages.".to_string())],
    );
    let phase = PackageManagerPhase::chocolatey();

    let first = run_adapter(&phase, &runner, false);
    assert_eq!(first.changed_count(), 3);
    assert_eq!(first.detail(), "3 packages upgraded");
    assert_eq!(runner.count("choco upgrade"), 1);

    let second = run_adapter(&phase, &runner, false);
    assert_eq!(second.state(), PhaseState::Succeeded);
    assert_eq!(second.changed_count(), 0);
    assert_eq!(
        runner.count("choco upgrade"),
        1,
        "second run must not dispatch the upgrade again"
    );
}

#[test]
fn timeout_then_success_within_retry_budget() {
    let runner = FakeRunner::windows_host();
    runner.script("choco outdated", vec![Ok(CHOCO_THREE_OUTDATED.to_string())]);
    runner.script(
        "choco upgrade",
        vec![
            Err(FailureKind::timeout(Duration::from_secs(600))),
            Ok("Chocolatey upgraded 3/3 packages.".to_string()),
        ],
    );
    let outcome = run_adapter(&PackageManagerPhase::chocolatey(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.changed_count(), 3);
    assert_eq!(runner.count("choco upgrade"), 2);
}

#[test]
fn mutating_failure_fails_phase_after_exhausting_retries() {
    let runner = FakeRunner::windows_host();
    runner.script("choco outdated", vec![Ok(CHOCO_THREE_OUTDATED.to_string())]);
    runner.script("choco upgrade", vec![command_failure()]);
    let ctx = PhaseContext::new(&runner, settings(3), false);
    let outcome = PackageManagerPhase::chocolatey()
        .run(&ctx)
        .expect("adapter must not error");

    assert_eq!(outcome.state(), PhaseState::Failed);
    assert_eq!(outcome.detail(), "upgrade failed");
    assert_eq!(
        outcome.failure_reason(),
        Some(&FailureKind::command_failure(Some(1), "The operation failed"))
    );
    assert_eq!(runner.count("choco upgrade"), 3);
}

#[test]
fn failed_pre_check_still_runs_upgrade() {
    let runner = FakeRunner::windows_host();
    runner.script("--include-unknown --accept-source-agreements", vec![command_failure()]);
    runner.script(
        "--all",
        vec![Ok("Successfully installed\nSuccessfully installed".to_string())],
    );
    let outcome = run_adapter(&PackageManagerPhase::winget(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.changed_count(), 2);
    let pre_check = runner
        .attempts()
        .into_iter()
        .find(|attempt| attempt.command == "winget upgrade --include-unknown --accept-source-agreements")
        .expect("pre-check must run");
    assert!(pre_check.ignore_failure);
    assert!(!pre_check.mutating);
}

#[test]
fn winget_dry_run_reports_would_upgrade() {
    let runner = FakeRunner::windows_host();
    runner.script(
        "winget upgrade --include-unknown",
        vec![Ok(concat!(
            "Name            Id                 Version   Available Source\n",
            "----------------------------------------------------------------\n",
            "Git             Git.Git            2.44.0    2.45.1    winget\n",
            "Node.js         OpenJS.NodeJS      20.11.0   20.15.0   winget\n",
            "2 upgrades available.\n"
        )
        .to_string())],
    );
    let outcome = run_adapter(&PackageManagerPhase::winget(), &runner, true);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.changed_count(), 2);
    assert_eq!(outcome.detail(), "would upgrade 2");
    assert!(runner.attempts().iter().all(|attempt| !attempt.mutating));
}

#[test]
fn windows_update_prepares_only_when_online() {
    let runner = FakeRunner::windows_host();
    runner.script("Install-WindowsUpdate", vec![Ok(String::new())]);

    let online = PhaseContext::new(&runner, settings(1), false).online(true);
    WindowsUpdatePhase::new().run(&online).expect("must run");
    let prepares = runner
        .attempts()
        .into_iter()
        .filter(|attempt| attempt.command.contains("Install-PackageProvider") || attempt.command.contains("Install-Module"))
        .collect::<Vec<_>>();
    assert_eq!(prepares.len(), 2);
    assert!(prepares.iter().all(|attempt| attempt.ignore_failure));

    let offline_runner = FakeRunner::windows_host();
    let offline = PhaseContext::new(&offline_runner, settings(1), false).online(false);
    WindowsUpdatePhase::new().run(&offline).expect("must run");
    assert_eq!(offline_runner.count("Install-Module"), 0);
    assert_eq!(offline_runner.count("Install-WindowsUpdate"), 1);
}

#[test]
fn windows_update_failed_prepare_does_not_fail_phase() {
    let runner = FakeRunner::windows_host();
    runner.script("Install-PackageProvider", vec![command_failure()]);
    runner.script("Install-Module", vec![command_failure()]);
    runner.script(
        "Install-WindowsUpdate",
        vec![Ok(concat!(
            "X ComputerName Result     KB          Size Title\n",
            "- ------------ ------     --          ---- -----\n",
            "3 HOST-01      Installed  KB5031356   79MB 2026-10 Cumulative Update\n",
            "3 HOST-01      Installed  KB890830    70MB Malicious Software Removal Tool\n"
        )
        .to_string())],
    );
    let outcome = run_adapter(&WindowsUpdatePhase::new(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.changed_count(), 2);
    assert_eq!(outcome.detail(), "2 updates installed");
}

#[test]
fn windows_update_install_failure_is_fatal_and_timeout_floor_applies() {
    let runner = FakeRunner::windows_host();
    runner.script("Install-WindowsUpdate", vec![command_failure()]);
    let outcome = run_adapter(&WindowsUpdatePhase::new(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Failed);
    let install = runner
        .attempts()
        .into_iter()
        .find(|attempt| attempt.command.contains("Install-WindowsUpdate"))
        .expect("install must run");
    assert!(!install.ignore_failure);
    assert!(install.mutating);
    assert_eq!(install.timeout, Some(UPDATE_TIMEOUT_FLOOR));
}

#[test]
fn windows_update_dry_run_lists_instead_of_installing() {
    let runner = FakeRunner::windows_host();
    runner.script(
        "Get-WindowsUpdate",
        vec![Ok("HOST-01 ------- KB5031356 79MB 2026-10 Cumulative Update".to_string())],
    );
    let outcome = run_adapter(&WindowsUpdatePhase::new(), &runner, true);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.detail(), "would install 1 update");
    assert_eq!(runner.count("Install-"), 0);
}

#[test]
fn store_failure_never_fails_phase() {
    let runner = FakeRunner::windows_host();
    runner.script("UpdateScanMethod", vec![command_failure()]);
    let outcome = run_adapter(&StorePhase::new(), &runner, false);

    assert_eq!(outcome.state(), PhaseState::Succeeded);
    assert_eq!(outcome.detail(), "update scan requested (no confirmation)");
    let scan = runner
        .attempts()
        .into_iter()
        .find(|attempt| attempt.command.contains("UpdateScanMethod"))
        .expect("scan must run");
    assert!(scan.ignore_failure);
}

#[test]
fn store_without_powershell_is_skipped() {
    let runner = FakeRunner::windows_host().without_tool("powershell");
    let outcome = run_adapter(&StorePhase::new(), &runner, false);
    assert_eq!(outcome.state(), PhaseState::Skipped);
    assert_eq!(outcome.detail(), "powershell not available");
}

#[test]
fn maintenance_runs_single_attempt_regardless_of_config() {
    let runner = FakeRunner::windows_host();
    runner.script("RestoreHealth", vec![command_failure()]);
    let ctx = PhaseContext::new(&runner, settings(5), false);
    let outcome = MaintenancePhase::health().run(&ctx).expect("must run");

    assert_eq!(outcome.state(), PhaseState::Failed);
    assert_eq!(outcome.detail(), "component store repair failed");
    let attempts = runner.attempts();
    let repair = attempts
        .iter()
        .filter(|attempt| attempt.command.contains("RestoreHealth"))
        .collect::<Vec<_>>();
    assert_eq!(repair.len(), 1);
    assert_eq!(repair[0].max_attempts, 1);
    assert_eq!(repair[0].timeout, Some(MAINTENANCE_TIMEOUT_FLOOR));
}

#[test]
fn maintenance_dry_run_makes_no_subprocess_call() {
    let runner = FakeRunner::windows_host();
    let outcome = run_adapter(&MaintenancePhase::cleanup(), &runner, true);
    assert_eq!(outcome.state(), PhaseState::Skipped);
    assert_eq!(outcome.detail(), "dry run: would run component cleanup");
    assert!(runner.attempts().is_empty());
}

#[test]
fn dry_run_never_issues_mutating_requests() {
    let runner = FakeRunner::windows_host();
    runner.script("choco outdated", vec![Ok(CHOCO_THREE_OUTDATED.to_string())]);
    runner.script("winget upgrade", vec![Ok("4 upgrades available.".to_string())]);
    let config = UpdateConfig {
        health_scan: true,
        component_cleanup: true,
        ..UpdateConfig::default()
    };
    let selection = PhaseSelection::resolve(&config);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, true, true);

    assert!(report.dry_run());
    assert_eq!(report.phases().len(), 6);
    let mutating = runner
        .attempts()
        .into_iter()
        .filter(|attempt| attempt.mutating)
        .map(|attempt| attempt.command)
        .collect::<Vec<_>>();
    assert!(mutating.is_empty(), "dry run issued mutating commands: {mutating:?}");
    assert_eq!(
        report.phase(PhaseKey::Chocolatey).map(PhaseOutcome::detail),
        Some("would upgrade 3")
    );
    assert_eq!(
        report.phase(PhaseKey::Winget).map(PhaseOutcome::detail),
        Some("would upgrade 4")
    );
}

enum StubBehavior {
    Succeed(u64),
    Error,
    Panic,
}

struct StubAdapter {
    key: PhaseKey,
    behavior: StubBehavior,
}

impl PhaseAdapter for StubAdapter {
    fn key(&self) -> PhaseKey {
        self.key
    }

    fn run(&self, _ctx: &PhaseContext<'_>) -> anyhow::Result<PhaseOutcome> {
        match self.behavior {
            StubBehavior::Succeed(changed) => Ok(PhaseOutcome::succeeded(
                self.key,
                changed,
                Duration::from_millis(5),
                "stub ok",
            )),
            StubBehavior::Error => Err(anyhow!("registry hive unavailable")),
            StubBehavior::Panic => panic!("adapter exploded"),
        }
    }
}

fn stub(key: PhaseKey, behavior: StubBehavior) -> Box<dyn PhaseAdapter> {
    Box::new(StubAdapter { key, behavior })
}

#[test]
fn failing_phase_does_not_suppress_siblings() {
    let runner = FakeRunner::windows_host();
    let config = UpdateConfig::default();
    let selection =
        PhaseSelection::explicit([PhaseKey::Winget, PhaseKey::Store, PhaseKey::WindowsUpdate]);
    let report = Orchestrator::new(&runner, &config)
        .with_adapters(vec![
            stub(PhaseKey::Winget, StubBehavior::Succeed(1)),
            stub(PhaseKey::Store, StubBehavior::Error),
            stub(PhaseKey::WindowsUpdate, StubBehavior::Succeed(2)),
        ])
        .run_all(&selection, false, true);

    let states = report
        .phases()
        .iter()
        .map(|outcome| (outcome.name(), outcome.state()))
        .collect::<Vec<_>>();
    assert_eq!(
        states,
        vec![
            (PhaseKey::Winget, PhaseState::Succeeded),
            (PhaseKey::Store, PhaseState::Failed),
            (PhaseKey::WindowsUpdate, PhaseState::Succeeded),
        ]
    );
    let reason = report
        .phase(PhaseKey::Store)
        .and_then(PhaseOutcome::failure_reason)
        .expect("failed phase carries reason");
    assert_eq!(
        reason,
        &FailureKind::adapter("registry hive unavailable")
    );
}

#[test]
fn panicking_phase_is_converted_to_failure() {
    let runner = FakeRunner::windows_host();
    let config = UpdateConfig::default();
    let selection = PhaseSelection::explicit([PhaseKey::Winget, PhaseKey::Chocolatey]);
    let report = Orchestrator::new(&runner, &config)
        .with_adapters(vec![
            stub(PhaseKey::Winget, StubBehavior::Panic),
            stub(PhaseKey::Chocolatey, StubBehavior::Succeed(4)),
        ])
        .run_all(&selection, false, true);

    assert_eq!(report.phases().len(), 2);
    let winget = report.phase(PhaseKey::Winget).expect("winget outcome");
    assert_eq!(winget.state(), PhaseState::Failed);
    assert_eq!(
        winget.failure_reason(),
        Some(&FailureKind::adapter("panicked: adapter exploded"))
    );
    assert_eq!(
        report.phase(PhaseKey::Chocolatey).map(PhaseOutcome::state),
        Some(PhaseState::Succeeded)
    );
    assert_eq!(runner.count("RebootPending"), 1, "reboot probe still runs");
}

#[test]
fn package_managers_overlap_but_never_exceed_cap() {
    let runner = FakeRunner::windows_host().with_delay(Duration::from_millis(150));
    runner.script("choco outdated", vec![Ok(CHOCO_NONE_OUTDATED.to_string())]);
    runner.script(
        "winget upgrade",
        vec![Ok("No installed package found matching input criteria.".to_string())],
    );
    let config = UpdateConfig::default();
    let selection = PhaseSelection::resolve(&config);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, false, true);

    assert_eq!(report.phases().len(), 4);
    assert_eq!(
        runner.max_in_flight.load(Ordering::SeqCst),
        MAX_CONCURRENT_PHASES,
        "winget and chocolatey must overlap in the concurrent stage"
    );

    let attempts = runner.attempts();
    let group_names = report.phases()[..2]
        .iter()
        .map(PhaseOutcome::name)
        .collect::<BTreeSet<_>>();
    let expected_group: BTreeSet<PhaseKey> =
        [PhaseKey::Winget, PhaseKey::Chocolatey].into_iter().collect();
    assert_eq!(group_names, expected_group);
    assert_eq!(report.phases()[2].name(), PhaseKey::Store);
    assert_eq!(report.phases()[3].name(), PhaseKey::WindowsUpdate);
    for attempt in attempts
        .iter()
        .filter(|attempt| attempt.command.contains("UpdateScanMethod") || attempt.command.contains("WindowsUpdate"))
    {
        assert_eq!(
            attempt.in_flight, 1,
            "sequential phase overlapped another command: {}",
            attempt.command
        );
    }
}

#[test]
fn sequential_mode_runs_one_command_at_a_time() {
    let runner = FakeRunner::windows_host().with_delay(Duration::from_millis(20));
    runner.script("choco outdated", vec![Ok(CHOCO_NONE_OUTDATED.to_string())]);
    let config = UpdateConfig::default();
    let selection = PhaseSelection::explicit([PhaseKey::Winget, PhaseKey::Chocolatey]);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, false, false);

    assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(report.phases()[0].name(), PhaseKey::Winget);
    assert_eq!(report.phases()[1].name(), PhaseKey::Chocolatey);
}

#[test]
fn indeterminate_reboot_probe_reports_false_with_warning() {
    let runner = FakeRunner::windows_host();
    runner.script("RebootPending", vec![command_failure()]);
    let config = UpdateConfig::default();
    let selection = PhaseSelection::explicit([PhaseKey::Store]);
    let report = Orchestrator::new(&runner, &config)
        .with_adapters(vec![stub(PhaseKey::Store, StubBehavior::Succeed(0))])
        .run_all(&selection, false, true);

    assert!(!report.reboot_required());
    assert!(report
        .warnings()
        .iter()
        .any(|warning| warning.contains("could not determine whether a reboot is pending")));
    assert_eq!(runner.count("RebootPending"), 1);
}

#[test]
fn pending_reboot_is_attached_to_report() {
    let runner = FakeRunner::windows_host();
    runner.script("RebootPending", vec![Ok("True".to_string())]);
    let config = UpdateConfig::default();
    let report = Orchestrator::new(&runner, &config)
        .with_adapters(Vec::new())
        .run_all(&PhaseSelection::explicit([]), false, true);

    assert!(report.reboot_required());
    assert!(report.phases().is_empty());
    assert!(report.warnings().is_empty());
}

#[test]
fn offline_run_warns_and_skips_preparation() {
    let runner = FakeRunner::windows_host();
    runner.script("ping", vec![command_failure()]);
    runner.script("Install-WindowsUpdate", vec![Ok(String::new())]);
    let config = UpdateConfig::default();
    let selection = PhaseSelection::explicit([PhaseKey::WindowsUpdate]);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, false, true);

    assert!(report
        .warnings()
        .iter()
        .any(|warning| warning.starts_with("offline:")));
    assert_eq!(runner.count("Install-Module"), 0);
    assert_eq!(
        report.phase(PhaseKey::WindowsUpdate).map(PhaseOutcome::state),
        Some(PhaseState::Succeeded)
    );
}

#[test]
fn offline_warning_mentions_preparation_only_when_it_would_run() {
    let runner = FakeRunner::windows_host();
    runner.script("ping", vec![command_failure()]);
    runner.script(
        "winget upgrade",
        vec![Ok("No installed package found matching input criteria.".to_string())],
    );
    let config = UpdateConfig::default();
    let selection = PhaseSelection::explicit([PhaseKey::Winget]);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, false, true);
    assert_eq!(
        report.warnings(),
        ["offline: no connectivity endpoint answered".to_string()]
    );

    let runner = FakeRunner::windows_host();
    runner.script("ping", vec![command_failure()]);
    let selection = PhaseSelection::explicit([PhaseKey::WindowsUpdate]);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, true, true);
    assert!(report
        .warnings()
        .iter()
        .all(|warning| !warning.contains("preparation")));
    assert!(report
        .warnings()
        .iter()
        .any(|warning| warning.starts_with("offline:")));
}

#[test]
fn per_phase_overrides_reach_requests() {
    let runner = FakeRunner::windows_host();
    runner.script("choco outdated", vec![Ok(CHOCO_THREE_OUTDATED.to_string())]);
    runner.script("choco upgrade", vec![command_failure()]);
    let config = UpdateConfig::from_toml_str(
        r#"
retries = 1
backoff_cap_secs = 0

[phases.chocolatey]
retries = 4
timeout_secs = 900
"#,
    )
    .expect("config must parse");
    let selection = PhaseSelection::explicit([PhaseKey::Chocolatey]);
    let report = Orchestrator::new(&runner, &config).run_all(&selection, false, true);

    assert!(report.any_failed());
    assert_eq!(runner.count("choco upgrade"), 4);
    let upgrade = runner
        .attempts()
        .into_iter()
        .find(|attempt| attempt.command.starts_with("choco upgrade"))
        .expect("upgrade attempted");
    assert_eq!(upgrade.timeout, Some(Duration::from_secs(900)));
}

struct CapturingReporter {
    seen: Mutex<Vec<RunReport>>,
}

impl Reporter for CapturingReporter {
    fn report(&self, report: &RunReport) -> anyhow::Result<()> {
        self.seen.lock().expect("seen lock").push(report.clone());
        Ok(())
    }
}

#[test]
fn run_and_report_hands_frozen_report_to_reporter() {
    let runner = FakeRunner::windows_host();
    let config = UpdateConfig::default();
    let reporter = CapturingReporter {
        seen: Mutex::new(Vec::new()),
    };
    let report = Orchestrator::new(&runner, &config)
        .with_adapters(vec![stub(PhaseKey::Winget, StubBehavior::Succeed(3))])
        .log_file("logs/update_log_20261019_101500.log")
        .run_and_report(&PhaseSelection::explicit([PhaseKey::Winget]), false, true, &reporter)
        .expect("report must succeed");

    let seen = reporter.seen.lock().expect("seen lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], report);
    assert_eq!(
        report.log_file().map(|path| path.display().to_string()),
        Some("logs/update_log_20261019_101500.log".to_string())
    );
}

#[test]
fn execution_plan_groups_package_managers_when_parallel() {
    let selection = PhaseSelection::resolve(&UpdateConfig {
        component_cleanup: true,
        ..UpdateConfig::default()
    });
    assert_eq!(
        execution_plan(&selection, true),
        vec![
            vec![PhaseKey::Winget, PhaseKey::Chocolatey],
            vec![PhaseKey::Store],
            vec![PhaseKey::WindowsUpdate],
            vec![PhaseKey::Cleanup],
        ]
    );
    assert_eq!(execution_plan(&selection, false)[0], vec![PhaseKey::Winget]);
    assert_eq!(execution_plan(&selection, false)[1], vec![PhaseKey::Chocolatey]);
}

#[test]
fn winget_counts_cover_common_outputs() {
    assert_eq!(counts::winget_available(""), None);
    assert_eq!(
        counts::winget_available("No installed package found matching input criteria."),
        Some(0)
    );
    assert_eq!(counts::winget_available("12 upgrades available."), Some(12));
    assert_eq!(
        counts::winget_available("Name Id Version Available\n------\nGit Git.Git 2.44 2.45\n"),
        Some(1)
    );
    assert_eq!(counts::winget_upgraded("Installer hash verified"), None);
}

#[test]
fn winget_table_count_ignores_spinner_frames() {
    let output = "   - \n   \\ \nName Id Version Available\n-----------------------------\nGit Git.Git 2.44 2.45\n";
    assert_eq!(counts::winget_available(output), Some(1));
}

#[test]
fn choco_counts_cover_common_outputs() {
    assert_eq!(counts::choco_outdated(CHOCO_THREE_OUTDATED), Some(3));
    assert_eq!(counts::choco_outdated("git|2.44.0|2.45.1|false"), Some(1));
    assert_eq!(counts::choco_outdated(""), None);
    assert_eq!(
        counts::choco_upgraded(" Chocolatey upgraded 2/5 packages.\n 3 packages failed."),
        Some(2)
    );
    assert_eq!(counts::choco_upgraded("nothing here"), None);
}
