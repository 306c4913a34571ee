//! Result rows, the run summary and the artifacts rendered from them.
//!
//! The runner only appends [`ResultRow`]s; everything here is presentation:
//! - `table`: boxed plain-text tables (stdout and the `.txt` artifact)
//! - `html`: the HTML report
//! - `checkstyle`: checkstyle XML with one error per non-OK row, for CI gates

pub mod checkstyle;
pub mod html;
pub mod table;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use self::table::{Align, TextTable};

pub const CHECKSTYLE_LOG_FILE: &str = "checkstyle-api-perf.log";
pub const CHECKSTYLE_TABLE_FILE: &str = "api_performance_checkstyle.txt";
pub const HTML_FILE: &str = "api_performance.html";

/// Timing value reported for FAILED and TIMEOUT rows.
pub const SENTINEL_MS: f64 = -1.0;

pub const RESULT_COLUMNS: [&str; 7] = [
    "API Call",
    "Description",
    "Objects",
    "Status",
    "Avg (ms)",
    "High (ms)",
    "Low (ms)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "SLOW")]
    Slow,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "DRY RUN")]
    DryRun,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Slow => "SLOW",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
            Self::DryRun => "DRY RUN",
        }
    }

    /// Rows with these statuses become checkstyle errors.
    pub fn is_problem(self) -> bool {
        matches!(self, Self::Slow | Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mean / max / min over one call's passes, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
}

impl LatencyStats {
    pub fn sentinel() -> Self {
        Self {
            avg_ms: SENTINEL_MS,
            max_ms: SENTINEL_MS,
            min_ms: SENTINEL_MS,
        }
    }

    /// `None` when there are no samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sum: f64 = samples.iter().sum();
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        Some(Self {
            avg_ms: sum / samples.len() as f64,
            max_ms: max,
            min_ms: min,
        })
    }
}

/// One line of the results table. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// `METHOD /path?query`
    pub label: String,
    pub description: String,
    pub objects: i64,
    pub status: Status,
    /// `None` for dry runs.
    pub latency: Option<LatencyStats>,
}

impl ResultRow {
    pub fn cells(&self) -> Vec<String> {
        let (avg, max, min) = match &self.latency {
            Some(stats) => (
                format_ms(stats.avg_ms),
                format_ms(stats.max_ms),
                format_ms(stats.min_ms),
            ),
            None => ("N/A".to_string(), "N/A".to_string(), "N/A".to_string()),
        };
        vec![
            self.label.clone(),
            self.description.clone(),
            self.objects.to_string(),
            self.status.to_string(),
            avg,
            max,
            min,
        ]
    }
}

fn format_ms(value: f64) -> String {
    format!("{value:.2}")
}

/// Key/value facts about the run shown above the results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    rows: Vec<(String, String)>,
}

impl Summary {
    pub fn new(base_url: &str, num_passes: u32, skipped_paths: &[String]) -> Self {
        let mut summary = Self::default();
        summary.push("API URL", base_url);
        summary.push("Number of requests per API call", num_passes.to_string());
        summary.push("Skipped API endpoints", skipped_paths.join("\n"));
        summary
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.rows.push((key.into(), value.into()));
    }

    pub fn rows(&self) -> &[(String, String)] {
        &self.rows
    }

    pub fn to_table(&self) -> TextTable {
        let mut table = TextTable::new(["Key", "Value"]);
        table.align(0, Align::Left).align(1, Align::Right);
        for (key, value) in &self.rows {
            table.add_row([key.clone(), value.clone()]);
        }
        table
    }
}

pub fn results_table(rows: &[ResultRow]) -> TextTable {
    let mut table = TextTable::new(RESULT_COLUMNS);
    table.align(0, Align::Left).align(1, Align::Left);
    for row in rows {
        table.add_row(row.cells());
    }
    table
}

/// Count of rows per status, in a fixed order.
pub fn status_counts(rows: &[ResultRow]) -> Vec<(Status, usize)> {
    [
        Status::Ok,
        Status::Slow,
        Status::Failed,
        Status::Timeout,
        Status::DryRun,
    ]
    .into_iter()
    .map(|status| (status, rows.iter().filter(|r| r.status == status).count()))
    .filter(|(status, count)| *count > 0 || *status != Status::DryRun)
    .collect()
}

/// Summary table, results table and a colored tally for the terminal.
pub fn render_terminal(summary: &Summary, rows: &[ResultRow]) -> String {
    let mut output = String::new();
    output.push_str(&summary.to_table().render());
    output.push_str(&results_table(rows).render());

    let tally: Vec<String> = status_counts(rows)
        .into_iter()
        .map(|(status, count)| {
            let text = format!("{count} {status}");
            match status {
                Status::Ok => text.green().to_string(),
                Status::Slow => text.yellow().to_string(),
                Status::Failed | Status::Timeout => text.red().bold().to_string(),
                Status::DryRun => text.cyan().to_string(),
            }
        })
        .collect();
    output.push_str(&tally.join(", "));
    output.push('\n');
    output
}

/// Writes report artifacts into one directory.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    fn write(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("create output directory {}", self.output_dir.display())
        })?;
        let path = self.path_for(file_name);
        std::fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        info!(component = "report", path = %path.display(), "Wrote report artifact");
        Ok(path)
    }

    /// Plain results table plus the HTML report.
    pub fn write_tables(&self, summary: &Summary, rows: &[ResultRow]) -> Result<Vec<PathBuf>> {
        let text = self.write(CHECKSTYLE_TABLE_FILE, &results_table(rows).render())?;
        let html = self.write(HTML_FILE, &html::render_report(summary, rows))?;
        Ok(vec![text, html])
    }

    /// Checkstyle XML whose line numbers point into the plain results table.
    pub fn write_checkstyle(&self, rows: &[ResultRow]) -> Result<PathBuf> {
        let table = results_table(rows);
        let xml = checkstyle::render(CHECKSTYLE_TABLE_FILE, rows, &table.row_lines());
        self.write(CHECKSTYLE_LOG_FILE, &xml)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
