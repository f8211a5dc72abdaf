//! Minimal "how many items" extraction from tool output.
//!
//! Every function returns `None` when the output carries no usable signal,
//! which includes the empty output of a swallowed advisory failure.

pub(crate) fn winget_available(output: &str) -> Option<u64> {
    if output.trim().is_empty() {
        return None;
    }
    for line in output.lines() {
        let lower = line.to_ascii_lowercase();
        if lower.contains("no installed package found") || lower.contains("no available upgrade") {
            return Some(0);
        }
        if lower.contains("upgrades available") || lower.contains("upgrade available") {
            if let Some(count) = leading_number(line) {
                return Some(count);
            }
        }
    }
    winget_table_rows(output)
}

pub(crate) fn winget_upgraded(output: &str) -> Option<u64> {
    if output.trim().is_empty() {
        return None;
    }
    let installed = count_lines(output, |line| {
        line.to_ascii_lowercase().contains("successfully installed")
    });
    (installed > 0).then_some(installed)
}

/// Rows below the `----` separator of a winget table, minus summary lines.
fn winget_table_rows(output: &str) -> Option<u64> {
    let mut lines = output.lines().map(str::trim);
    // winget's progress spinner prints lone `-` frames before the table.
    lines.find(|line| line.len() >= 3 && line.chars().all(|ch| ch == '-'))?;
    Some(count_lines_iter(lines, |line| {
        !line.is_empty() && !line.to_ascii_lowercase().contains("available")
    }))
}

pub(crate) fn choco_outdated(output: &str) -> Option<u64> {
    for line in output.lines() {
        if let Some(rest) = after_marker(line, "Chocolatey has determined ") {
            return leading_number(rest);
        }
    }
    let pipe_rows = count_lines(output, |line| line.matches('|').count() >= 3);
    (pipe_rows > 0).then_some(pipe_rows)
}

pub(crate) fn choco_upgraded(output: &str) -> Option<u64> {
    output
        .lines()
        .find_map(|line| after_marker(line, "Chocolatey upgraded "))
        .and_then(leading_number)
}

pub(crate) fn windows_updates_listed(output: &str) -> Option<u64> {
    if output.trim().is_empty() {
        return None;
    }
    Some(count_lines(output, contains_kb_number))
}

pub(crate) fn windows_updates_installed(output: &str) -> Option<u64> {
    if output.trim().is_empty() {
        return None;
    }
    Some(count_lines(output, |line| {
        contains_kb_number(line) && line.contains("Installed")
    }))
}

fn count_lines(output: &str, predicate: impl Fn(&str) -> bool) -> u64 {
    count_lines_iter(output.lines().map(str::trim), predicate)
}

fn count_lines_iter<'a>(
    lines: impl Iterator<Item = &'a str>,
    predicate: impl Fn(&str) -> bool,
) -> u64 {
    lines.filter(|line| predicate(*line)).count() as u64
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|index| &line[index + marker.len()..])
}

/// Parses the first run of ASCII digits at the start of `text`.
fn leading_number(text: &str) -> Option<u64> {
    let digits = text
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().ok()
}

fn contains_kb_number(line: &str) -> bool {
    line.match_indices("KB").any(|(index, _)| {
        line[index + 2..]
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_digit())
    })
}
