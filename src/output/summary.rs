use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::analysis::links::commit_url;
use crate::dashboard::{GapInterval, Grade, MetricSpecs, MonitorPayload};
use crate::models::{Job, PackageKey};

use super::styling::{accent, graded, heading, muted, pass, warn};
use super::tables::{color_coded_gap_cell, color_coded_value_cell, create_table};

const RECENT_ROWS: usize = 10;

/// Prints a human-readable summary of a monitor payload to stdout.
///
/// Sections:
/// - Overview: dataset, metric, window, latest value and thresholds
/// - Recent Measurements: newest jobs with grade-coloured values
/// - Package Changes: commits introduced by the newest jobs
/// - Gaps in CI Ids: runs missing between consecutive measurements
pub fn print_summary(payload: &MonitorPayload) {
    println!("{}", render_summary(payload));
}

/// Prints the packages a job changed relative to its previous comparable job.
pub fn print_changes(job: &Job, changed: &[PackageKey]) {
    println!("{}", render_changes(job, changed));
}

fn render_changes(job: &Job, changed: &[PackageKey]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📦", "Changed Packages");

    let _ = writeln!(
        output,
        "  {} {} {}\n  {} {}\n  {} {}\n",
        muted("Job:"),
        accent(job.id),
        muted(format!("(ci_id {})", job.ci_id)),
        muted("Dataset:"),
        accent(&job.ci_dataset),
        muted("Date:"),
        muted(job.date.format("%Y-%m-%d %H:%M UTC")),
    );

    if changed.is_empty() {
        let _ = writeln!(output, "  {}", pass("No packages changed."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Package", "Commit", "URL"]));
    for package in changed {
        table.add_row(vec![
            Cell::new(&package.name),
            Cell::new(&package.git_commit),
            Cell::new(commit_url(&package.git_url, &package.git_commit)),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", heading(emoji), heading(title).underlined());
}

fn format_threshold(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v}"))
}

fn grade_label(grade: Option<Grade>) -> &'static str {
    grade.map_or("-", Grade::as_str)
}

fn styled_value(specs: &MetricSpecs, value: f64) -> String {
    let text = format!("{value:.3} {}", specs.unit);
    graded(text, specs.grade(value))
}

fn render_overview(output: &mut String, payload: &MonitorPayload) {
    add_section_header(output, "📊", "Overview");

    let specs = &payload.specs;
    let history = &payload.history;

    let latest = history
        .values
        .last()
        .map_or_else(|| muted("none").to_string(), |&v| styled_value(specs, v));

    let _ = write!(
        output,
        "  {} {}\n  {} {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        muted("Dataset:"),
        accent(&payload.dataset),
        muted("Metric:"),
        accent(&specs.metric),
        muted(&specs.description),
        muted("Window:"),
        warn(payload.window),
        muted("Measurements:"),
        warn(history.len()),
        muted("Latest value:"),
        latest,
    );

    let _ = write!(
        output,
        "  {} {} minimum {}, design {}, stretch {}\n  {} {}\n\n",
        muted("Specification:"),
        specs.operator,
        format_threshold(specs.minimum),
        format_threshold(specs.design),
        format_threshold(specs.stretch),
        muted("Collected:"),
        muted(payload.collected_at.format("%Y-%m-%d %H:%M UTC")),
    );
}

fn render_measurements(output: &mut String, payload: &MonitorPayload) {
    add_section_header(output, "📈", "Recent Measurements");

    let history = &payload.history;
    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "CI Id",
        "Date",
        "Value",
        "Grade",
        "Changed Packages",
    ]));

    for i in (0..history.len()).rev().take(RECENT_ROWS) {
        let value = history.values[i];
        let grade = payload.specs.grade(value);
        let packages = if history.package_names[i].is_empty() {
            "-".to_string()
        } else {
            history.package_names[i].join("\n")
        };

        table.add_row(vec![
            Cell::new(history.ci_ids[i]),
            Cell::new(history.dates[i].format("%Y-%m-%d %H:%M")),
            color_coded_value_cell(value, grade),
            Cell::new(grade_label(grade)),
            Cell::new(packages),
        ]);
    }

    if history.len() > RECENT_ROWS {
        let mut row = vec![Cell::new(format!(
            "... and {} earlier",
            history.len() - RECENT_ROWS
        ))
        .fg(TableColor::DarkGrey)];
        row.extend(vec![Cell::new(""); 4]);
        table.add_row(row);
    }

    let _ = writeln!(output, "{table}\n");
}

fn render_package_changes(output: &mut String, payload: &MonitorPayload) {
    let history = &payload.history;

    let rows: Vec<(i64, &str, &str)> = (0..history.len())
        .rev()
        .flat_map(|i| {
            history.package_names[i]
                .iter()
                .zip(&history.package_urls[i])
                .map(move |(name, url)| (history.ci_ids[i], name.as_str(), url.as_str()))
        })
        .take(RECENT_ROWS)
        .collect();

    if rows.is_empty() {
        return;
    }

    add_section_header(output, "📦", "Package Changes");

    let mut table = create_table();
    table.set_header(create_cyan_header(&["CI Id", "Package", "Commit"]));
    for (ci_id, name, url) in rows {
        table.add_row(vec![Cell::new(ci_id), Cell::new(name), Cell::new(url)]);
    }

    let _ = writeln!(output, "{table}\n");
}

fn render_gaps(output: &mut String, payload: &MonitorPayload) {
    let history = &payload.history;

    let gaps: Vec<(usize, &GapInterval)> = payload
        .gaps
        .iter()
        .enumerate()
        .filter(|(_, gap)| gap.is_gap())
        .collect();

    add_section_header(output, "🕳️", "Gaps in CI Ids");

    if gaps.is_empty() {
        let _ = writeln!(output, "  {}\n", pass("No gaps found."));
        return;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["After", "Before", "Missing", "From", "To"]));
    for (i, gap) in gaps {
        table.add_row(vec![
            Cell::new(history.ci_ids[i]),
            Cell::new(history.ci_ids[i + 1]),
            color_coded_gap_cell(gap.missing),
            Cell::new(gap.start.format("%Y-%m-%d %H:%M")),
            Cell::new(gap.end.format("%Y-%m-%d %H:%M")),
        ]);
    }

    let _ = writeln!(output, "{table}\n");
}

fn render_summary(payload: &MonitorPayload) -> String {
    let mut output = String::new();

    render_overview(&mut output, payload);

    if payload.history.is_empty() {
        let _ = writeln!(
            output,
            "{}",
            warn("No measurements found for this dataset and metric.")
        );
        return output;
    }

    render_measurements(&mut output, payload);
    render_package_changes(&mut output, payload);
    render_gaps(&mut output, payload);

    output
}
