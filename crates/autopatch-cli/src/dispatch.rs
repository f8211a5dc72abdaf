use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use autopatch_core::{PhaseKey, PhaseSelection, PhaseSettings, RunReport, UpdateConfig};
use autopatch_exec::SystemCommandRunner;
use autopatch_phases::{
    execution_plan, Orchestrator, Reporter, MAINTENANCE_TIMEOUT_FLOOR, UPDATE_TIMEOUT_FLOOR,
};
use chrono::Local;
use tracing::{error, info, warn};

use crate::completion::write_completions_script;
use crate::logging::{
    default_config_path, default_log_dir, init_logging, log_file_path, report_file_path,
    run_stamp,
};
use crate::render::{current_output_style, format_plan_lines, reporter_for, OutputStyle};
use crate::{Cli, Commands, OutputFormat, RunArgs, SelectionArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<u8> {
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Run(RunArgs::default()));

    match command {
        Commands::Run(args) => run_update(cli.config.as_deref(), &args, cli.output),
        Commands::Plan(args) => {
            let config = resolve_config(cli.config.as_deref(), &args)?;
            print_plan(&config, cli.output)?;
            Ok(0)
        }
        Commands::Report { path } => {
            let report = RunReport::read_from(&path)?;
            reporter_for(cli.output).report(&report)?;
            Ok(0)
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
            Ok(0)
        }
    }
}

fn run_update(
    config_path: Option<&Path>,
    args: &RunArgs,
    output: Option<OutputFormat>,
) -> Result<u8> {
    let mut config = resolve_config(config_path, &args.selection)?;
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = Some(log_dir.clone());
    }
    let log_dir = match &config.log_dir {
        Some(log_dir) => log_dir.clone(),
        None => default_log_dir()?,
    };

    let stamp = run_stamp(Local::now());
    let log_file = log_file_path(&log_dir, &stamp);
    init_logging(&log_file)?;
    info!(log_file = %log_file.display(), "logging initialized");

    let selection = PhaseSelection::resolve(&config);
    if selection.is_empty() {
        warn!("no phases selected; only the reboot check will run");
    }

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| report_file_path(&log_dir, &stamp));
    let runner = SystemCommandRunner::new();
    let presenter = reporter_for(output);
    let reporter = PersistingReporter {
        path: &report_path,
        presenter: presenter.as_ref(),
    };
    let report = Orchestrator::new(&runner, &config)
        .log_file(&log_file)
        .run_and_report(&selection, config.dry_run, config.parallel, &reporter)?;

    let code = report.status().exit_code();
    Ok(u8::try_from(code).unwrap_or(1))
}

/// Saves the report before presenting it. Monitoring reads the saved file, so
/// a failed presentation (closed stdout, broken pipe) is only logged.
pub(crate) struct PersistingReporter<'a> {
    pub(crate) path: &'a Path,
    pub(crate) presenter: &'a dyn Reporter,
}

impl Reporter for PersistingReporter<'_> {
    fn report(&self, report: &RunReport) -> Result<()> {
        let saved = report.write_to(self.path);
        match &saved {
            Ok(()) => info!(path = %self.path.display(), "run report saved"),
            Err(err) => error!(
                path = %self.path.display(),
                error = %format!("{err:#}"),
                "failed to save run report"
            ),
        }
        if let Err(err) = self.presenter.report(report) {
            warn!(error = %format!("{err:#}"), "failed to present run report");
        }
        saved
    }
}

/// File values first, command-line flags on top, validated once.
pub(crate) fn resolve_config(path: Option<&Path>, args: &SelectionArgs) -> Result<UpdateConfig> {
    let mut config = load_config(path)?;
    apply_selection_args(&mut config, args);
    config.validate().context("invalid command-line overrides")?;
    Ok(config)
}

fn load_config(path: Option<&Path>) -> Result<UpdateConfig> {
    if let Some(path) = path {
        return UpdateConfig::load(path);
    }
    match default_config_path() {
        Ok(path) if path.is_file() => UpdateConfig::load(&path),
        _ => Ok(UpdateConfig::default()),
    }
}

pub(crate) fn apply_selection_args(config: &mut UpdateConfig, args: &SelectionArgs) {
    config.dry_run |= args.dry_run;
    if args.sequential {
        config.parallel = false;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if !args.only.is_empty() {
        config.only = Some(args.only.clone());
    }

    let flagged = [
        (args.skip_winget, PhaseKey::Winget),
        (args.skip_choco, PhaseKey::Chocolatey),
        (args.skip_store, PhaseKey::Store),
        (args.skip_windows_update, PhaseKey::WindowsUpdate),
    ];
    let skipped = args.skip.iter().copied().chain(
        flagged
            .into_iter()
            .filter_map(|(skip, key)| skip.then_some(key)),
    );
    for key in skipped {
        if !config.skip.contains(&key) {
            config.skip.push(key);
        }
    }

    config.health_scan |= args.health_scan;
    config.component_cleanup |= args.component_cleanup;
}

/// Settings as the adapter will actually apply them, including the
/// timeout floors and single-attempt rule of the long-running phases.
pub(crate) fn effective_settings(config: &UpdateConfig, key: PhaseKey) -> PhaseSettings {
    let settings = config.settings_for(key);
    match key {
        PhaseKey::WindowsUpdate => settings.with_timeout_floor(UPDATE_TIMEOUT_FLOOR),
        PhaseKey::Health | PhaseKey::Cleanup => settings
            .with_timeout_floor(MAINTENANCE_TIMEOUT_FLOOR)
            .single_attempt(),
        PhaseKey::Winget | PhaseKey::Chocolatey | PhaseKey::Store => settings,
    }
}

fn print_plan(config: &UpdateConfig, output: Option<OutputFormat>) -> Result<()> {
    let selection = PhaseSelection::resolve(config);
    let stages = execution_plan(&selection, config.parallel);

    let style = match output {
        Some(OutputFormat::Json) => {
            let document = serde_json::json!({
                "dryRun": config.dry_run,
                "parallel": config.parallel,
                "stages": stages,
            });
            let rendered = serde_json::to_string_pretty(&document)
                .context("failed to serialize update plan")?;
            writeln!(std::io::stdout().lock(), "{rendered}")
                .context("failed writing update plan")?;
            return Ok(());
        }
        Some(OutputFormat::Plain) => OutputStyle::Plain,
        Some(OutputFormat::Rich) => OutputStyle::Rich,
        None => current_output_style(),
    };

    let lines = format_plan_lines(
        &stages,
        |key| effective_settings(config, key),
        config.dry_run,
        style,
    );
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}").context("failed writing update plan")?;
    }
    Ok(())
}
