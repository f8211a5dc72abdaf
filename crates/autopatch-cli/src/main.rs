use std::path::PathBuf;
use std::process::ExitCode;

use autopatch_core::PhaseKey;
use clap::{Args, Parser, Subcommand, ValueEnum};

mod completion;
mod dispatch;
mod logging;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "autopatch")]
#[command(
    about = "Unattended updates for package managers, the app store and the OS",
    long_about = None
)]
struct Cli {
    /// TOML config file; defaults to config.toml in the autopatch data directory.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Output format; defaults to rich on a terminal and plain otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every selected phase (the default).
    Run(RunArgs),
    /// Print the resolved phases and execution order without running anything.
    Plan(SelectionArgs),
    /// Render a saved run report.
    Report { path: PathBuf },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Plain,
    Rich,
    Json,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct SelectionArgs {
    #[arg(long)]
    dry_run: bool,
    /// Run the package managers one after another.
    #[arg(long)]
    sequential: bool,
    /// Per-command timeout in seconds; 0 disables it.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    #[arg(long)]
    retries: Option<u32>,
    /// Run exactly these phases, ignoring every skip and opt-in flag.
    #[arg(long, value_delimiter = ',', value_parser = PhaseKey::parse)]
    only: Vec<PhaseKey>,
    #[arg(long, value_delimiter = ',', value_parser = PhaseKey::parse)]
    skip: Vec<PhaseKey>,
    #[arg(long)]
    skip_winget: bool,
    #[arg(long)]
    skip_choco: bool,
    #[arg(long)]
    skip_store: bool,
    #[arg(long)]
    skip_windows_update: bool,
    /// Repair the component store with DISM.
    #[arg(long)]
    health_scan: bool,
    #[arg(long)]
    component_cleanup: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct RunArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    /// Where to save the JSON run report; defaults to next to the log file.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_cli(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
