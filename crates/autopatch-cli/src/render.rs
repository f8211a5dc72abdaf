use std::io::{IsTerminal, Write};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use anyhow::{Context, Result};
use autopatch_core::{PhaseKey, PhaseOutcome, PhaseSettings, PhaseState, RunReport};
use autopatch_phases::Reporter;
use indicatif::HumanDuration;

use crate::OutputFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_terminal: bool, no_color: bool) -> OutputStyle {
    if stdout_is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn reporter_for(format: Option<OutputFormat>) -> Box<dyn Reporter> {
    match format {
        Some(OutputFormat::Json) => Box::new(StructuredReporter),
        Some(OutputFormat::Plain) => Box::new(PlainTextReporter::new(OutputStyle::Plain)),
        Some(OutputFormat::Rich) => Box::new(PlainTextReporter::new(OutputStyle::Rich)),
        None => Box::new(PlainTextReporter::new(current_output_style())),
    }
}

/// Line-oriented summary for people; `Rich` adds badges and a colored header.
#[derive(Copy, Clone, Debug)]
pub(crate) struct PlainTextReporter {
    style: OutputStyle,
}

impl PlainTextReporter {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self { style }
    }
}

impl Reporter for PlainTextReporter {
    fn report(&self, report: &RunReport) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        for line in format_report_lines(report, self.style) {
            writeln!(stdout, "{line}").context("failed writing run summary")?;
        }
        Ok(())
    }
}

/// Prints the report document as pretty JSON on stdout.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct StructuredReporter;

impl Reporter for StructuredReporter {
    fn report(&self, report: &RunReport) -> Result<()> {
        let rendered = report.to_json()?;
        writeln!(std::io::stdout().lock(), "{rendered}").context("failed writing run report")?;
        Ok(())
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "error" => "[ERR]",
        "warn" => "[WARN]",
        _ => "[..]",
    }
}

fn state_status(state: PhaseState) -> &'static str {
    match state {
        PhaseState::Succeeded => "ok",
        PhaseState::Skipped => "step",
        PhaseState::Failed => "error",
    }
}

pub(crate) fn format_phase_line(outcome: &PhaseOutcome) -> String {
    let name = outcome.name();
    let detail = outcome.detail();
    match outcome.state() {
        PhaseState::Skipped => format!("{name}: skipped ({detail})"),
        PhaseState::Succeeded => format!(
            "{name}: succeeded changed={} in {} ({detail})",
            outcome.changed_count(),
            HumanDuration(outcome.duration())
        ),
        PhaseState::Failed => {
            let reason = outcome
                .failure_reason()
                .map(ToString::to_string)
                .unwrap_or_default();
            format!(
                "{name}: failed in {} ({detail}): {reason}",
                HumanDuration(outcome.duration())
            )
        }
    }
}

pub(crate) fn format_run_summary_line(report: &RunReport) -> String {
    let count = |state: PhaseState| {
        report
            .phases()
            .iter()
            .filter(|outcome| outcome.state() == state)
            .count()
    };
    format!(
        "update summary: succeeded={} skipped={} failed={} changed={} reboot-required={}",
        count(PhaseState::Succeeded),
        count(PhaseState::Skipped),
        count(PhaseState::Failed),
        report.total_changed(),
        yes_no(report.reboot_required())
    )
}

pub(crate) fn format_report_lines(report: &RunReport, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    let title = if report.dry_run() {
        "update run (dry run)"
    } else {
        "update run"
    };
    if let Some(header) = render_section_header(style, title) {
        lines.push(header);
    }

    if report.phases().is_empty() {
        lines.push(render_status_line(style, "warn", "no phases selected"));
    }
    for outcome in report.phases() {
        lines.push(render_status_line(
            style,
            state_status(outcome.state()),
            &format_phase_line(outcome),
        ));
    }
    for warning in report.warnings() {
        lines.push(format_warning_line(style, warning));
    }
    if report.reboot_required() {
        lines.push(render_status_line(
            style,
            "warn",
            "reboot required to finish applying updates",
        ));
    }

    let summary_status = if report.any_failed() { "error" } else { "ok" };
    lines.push(render_status_line(
        style,
        summary_status,
        &format_run_summary_line(report),
    ));
    if let Some(log_file) = report.log_file() {
        lines.push(format!("log: {}", log_file.display()));
    }
    lines
}

fn format_warning_line(style: OutputStyle, warning: &str) -> String {
    match style {
        OutputStyle::Plain => format!("warning: {warning}"),
        OutputStyle::Rich => render_status_line(style, "warn", warning),
    }
}

pub(crate) fn format_plan_lines(
    stages: &[Vec<PhaseKey>],
    settings: impl Fn(PhaseKey) -> PhaseSettings,
    dry_run: bool,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(header) = render_section_header(style, "update plan") {
        lines.push(header);
    }
    lines.push(format!("dry-run: {}", yes_no(dry_run)));
    if stages.is_empty() {
        lines.push(render_status_line(style, "warn", "no phases selected"));
        return lines;
    }

    for (index, stage) in stages.iter().enumerate() {
        let names = stage
            .iter()
            .map(PhaseKey::as_str)
            .collect::<Vec<_>>()
            .join(" + ");
        let suffix = if stage.len() > 1 { " (concurrent)" } else { "" };
        lines.push(format!("stage {}: {names}{suffix}", index + 1));
        for key in stage {
            let phase_settings = settings(*key);
            let mut line = format!(
                "  {key}: timeout={} attempts={}",
                format_timeout(phase_settings.timeout),
                phase_settings.retries
            );
            if phase_settings.retries > 1 {
                let backoff = phase_settings.backoff;
                line.push_str(&format!(
                    " backoff={}s..{}s",
                    backoff.base_secs(),
                    backoff.cap().as_secs()
                ));
            }
            lines.push(line);
        }
    }
    lines
}

fn format_timeout(timeout: Option<Duration>) -> String {
    match timeout {
        Some(limit) => HumanDuration(limit).to_string(),
        None => "unbounded".to_string(),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
