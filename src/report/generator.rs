//! Report generation.
//!
//! Renders an [`AnalysisReport`] as CSV (one flat line per metric row),
//! pretty JSON, or a Markdown summary.

use crate::models::{AnalysisReport, MetricRow, ReportMetadata, RunSummary};
use anyhow::{Context, Result};
use std::fmt::Display;
use std::path::Path;

const CSV_HEADERS: [&str; 18] = [
    "Start Date",
    "End Date",
    "Demographic",
    "Period Spend",
    "Period Reach",
    "Period Impressions",
    "Period Conversions",
    "Period Revenue",
    "Period Frequency",
    "Period CPM",
    "Period CPMr",
    "Period CPA",
    "Period ROAS",
    "Rolling Reach",
    "Cumulative Impressions",
    "Rolling Frequency",
    "Incremental Reach",
    "CPMi",
];

const ROLLING28_HEADERS: [&str; 3] = [
    "28-Day Rolling Reach",
    "28-Day Incremental Reach",
    "28-Day CPMi",
];

/// Empty cell for null values.
fn cell<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Generate the CSV export. The rolling-28 columns are only present for
/// rolling-28 analyses.
pub fn generate_csv_report(report: &AnalysisReport) -> String {
    let rolling28 = report.is_rolling28();
    let mut output = String::new();

    let mut headers: Vec<&str> = CSV_HEADERS.to_vec();
    if rolling28 {
        headers.extend(ROLLING28_HEADERS);
    }
    output.push_str(&headers.join(","));
    output.push('\n');

    for row in &report.rows {
        output.push_str(&csv_line(row, rolling28));
        output.push('\n');
    }

    output
}

fn csv_line(row: &MetricRow, rolling28: bool) -> String {
    let mut fields = vec![
        row.period_start.format("%Y-%m-%d").to_string(),
        row.period_end.format("%Y-%m-%d").to_string(),
        row.demographic.to_string(),
        row.period_spend.to_string(),
        row.period_reach.to_string(),
        row.period_impressions.to_string(),
        row.period_conversions.to_string(),
        row.period_revenue.to_string(),
        row.period_frequency.to_string(),
        row.period_cpm.to_string(),
        row.period_cpmr.to_string(),
        cell(row.period_cpa),
        cell(row.period_roas),
        row.rolling_reach.to_string(),
        row.cumulative_impressions.to_string(),
        row.rolling_frequency.to_string(),
        row.incremental_reach.to_string(),
        cell(row.cpim),
    ];

    if rolling28 {
        fields.push(cell(row.rolling28_reach));
        fields.push(cell(row.rolling28_incremental_reach));
        fields.push(cell(row.rolling28_cpmi));
    }

    fields.join(",")
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AnalysisReport, decimals: usize) -> String {
    let mut output = String::new();

    output.push_str("# ReachScope Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.summary, decimals));
    output.push_str(&generate_metrics_section(&report.rows, decimals));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let analysis = &metadata.analysis;
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Name:** {}\n",
        analysis.name.as_deref().unwrap_or("Unnamed")
    ));
    section.push_str(&format!(
        "- **Entity:** `{}` ({})\n",
        analysis.entity_id, analysis.level
    ));
    section.push_str(&format!(
        "- **Date Range:** {} - {}\n",
        analysis.date_start.format("%b %-d, %Y"),
        analysis.date_end.format("%b %-d, %Y")
    ));
    section.push_str(&format!("- **Interval:** {}\n", analysis.interval));
    section.push_str(&format!(
        "- **Demographics:** {}\n",
        if analysis.include_demographics { "yes" } else { "no" }
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Rows:** {}\n", metadata.row_count));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_summary_section(summary: &RunSummary, decimals: usize) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Periods | Spend | Impressions | Cumulative Reach | CPMi | ROAS |\n");
    section.push_str("|:---:|---:|---:|---:|---:|---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n\n",
        summary.periods,
        format_currency(Some(summary.total_spend), decimals),
        format_count(summary.total_impressions),
        format_count(summary.final_cumulative_reach),
        format_currency(summary.overall_cpmi, decimals),
        summary
            .overall_roas
            .map_or_else(|| "-".to_string(), |roas| format!("{:.*}", decimals, roas)),
    ));

    if summary.negative_incremental_periods > 0 {
        section.push_str(&format!(
            "> ⚠️ Cumulative reach decreased in {} period(s); their incremental reach is negative and CPMi is left blank.\n\n",
            summary.negative_incremental_periods
        ));
    }

    section
}

fn generate_metrics_section(rows: &[MetricRow], decimals: usize) -> String {
    let mut section = String::new();

    section.push_str("## Metrics\n\n");
    if rows.is_empty() {
        section.push_str("No periods fell inside the requested date range.\n\n");
        return section;
    }

    section.push_str("| Start Date | Demographic | Reach | Impressions | Spend | CPMr | CPMi |\n");
    section.push_str("|:---|:---|---:|---:|---:|---:|---:|\n");

    for row in rows {
        let cells = [
            row.period_start.format("%b %-d").to_string(),
            row.demographic.to_string(),
            format_count(row.period_reach),
            format_count(row.period_impressions),
            format_currency(Some(row.period_spend), decimals),
            format_currency(Some(row.period_cpmr), decimals),
            format_currency(row.cpim, decimals),
        ];

        let line = if row.demographic.is_total() {
            cells.map(|c| format!("**{}**", c)).join(" | ")
        } else {
            cells.join(" | ")
        };
        section.push_str(&format!("| {} |\n", line));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by ReachScope*\n".to_string()
}

/// `1234567` -> `1,234,567`
fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::new();

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn format_currency(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("${:.*}", decimals, v),
        None => "-".to_string(),
    }
}

/// Write rendered report content to a file, creating parent directories.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
