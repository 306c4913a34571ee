//! api-perf: measure the latency of every GET endpoint an OpenAPI/Swagger
//! document describes.
//!
//! The spec is fetched, turned into a [`plan::CallPlan`] (one call per valid
//! query-parameter assignment, list endpoints before their single-object
//! counterparts), executed a configurable number of times per call, and
//! reported as tables, HTML and checkstyle XML.

pub mod config;
pub mod openapi;
pub mod plan;
pub mod report;
pub mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_CONFIG_FILE, PerfConfig};
use crate::openapi::ApiDocument;
use crate::plan::PlanBuilder;
use crate::report::{ArtifactWriter, Summary, render_terminal};
use crate::runner::transport::HttpTransport;
use crate::runner::{RunContext, RunSettings, Runner};

pub const DEFAULT_SPEC_URL: &str = "http://localhost:8080/api/v1/openapi";

/// Command-line interface.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "api-perf",
    version,
    about = "Measure API endpoint latency from an OpenAPI document"
)]
pub struct Cli {
    /// URL of the OpenAPI/Swagger document
    #[arg(long, env = "API_PERF_SPEC_URL", default_value = DEFAULT_SPEC_URL)]
    pub api_spec_url: String,

    /// JSON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Write checkstyle XML plus the plain and HTML result tables
    #[arg(long)]
    pub checkstyle: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Build the plan and report it without sending any request
    #[arg(long)]
    pub dry_run: bool,

    /// Write the HTML report and the plain result table
    #[arg(long)]
    pub html: bool,

    /// Print the summary and result tables to stdout
    #[arg(long)]
    pub print: bool,

    /// Directory for report artifacts
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

/// Install the stderr fmt subscriber. `RUST_LOG` wins over `--debug`.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    run_with(&cli)
}

/// Load config, fetch the spec, build and execute the plan, then report.
pub fn run_with(cli: &Cli) -> Result<()> {
    let config = PerfConfig::load_from(&cli.config_file)
        .with_context(|| format!("load config {}", cli.config_file.display()))?;
    debug!(component = "cli", config = ?config, "Loaded configuration");

    let transport = HttpTransport::new(&config.headers, config.request_timeout())
        .context("build HTTP client")?;

    let document = ApiDocument::fetch(transport.client(), &cli.api_spec_url)
        .with_context(|| format!("fetch API spec from {}", cli.api_spec_url))?;
    let base_url = document
        .base_url(&cli.api_spec_url)
        .context("derive API base URL")?;
    info!(component = "cli", base_url = %base_url, "Using API base URL");

    let mut summary = Summary::new(&base_url, config.number_of_passes, &config.path_blacklist);

    let plan = PlanBuilder::new(&document, &config).build();
    info!(
        component = "cli",
        calls = plan.len(),
        indexable = plan.indexable.len(),
        "Built call plan"
    );

    let settings = RunSettings::from_config(&config, cli.dry_run);
    let runner = Runner::new(transport, base_url, settings);
    let mut ctx = RunContext::new();
    runner.run(&plan, &mut ctx);
    let rows = ctx.results();

    if cli.print {
        print!("{}", render_terminal(&summary, rows));
    }

    if cli.dry_run {
        if cli.html || cli.checkstyle {
            info!(component = "cli", "Dry run: no report artifacts written");
        }
        return Ok(());
    }

    if cli.html || cli.checkstyle {
        summary.push(
            "SLOW threshold (object list)",
            format!("{} ms", config.average_threshold_for_list),
        );
        summary.push(
            "SLOW threshold (single object)",
            format!("{} ms", config.average_threshold_for_object),
        );
        let writer = ArtifactWriter::new(&cli.output_dir);
        writer.write_tables(&summary, rows)?;
        if cli.checkstyle {
            writer.write_checkstyle(rows)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["api-perf"]).unwrap();
        assert_eq!(cli.config_file, PathBuf::from("perf_config.json"));
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(!cli.checkstyle && !cli.debug && !cli.dry_run && !cli.html && !cli.print);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "api-perf",
            "--api-spec-url",
            "http://h/spec",
            "--config-file",
            "c.json",
            "--checkstyle",
            "--dry-run",
            "--print",
            "--output-dir",
            "out",
        ])
        .unwrap();
        assert_eq!(cli.api_spec_url, "http://h/spec");
        assert_eq!(cli.config_file, PathBuf::from("c.json"));
        assert!(cli.checkstyle && cli.dry_run && cli.print);
        assert!(!cli.html);
        assert_eq!(cli.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_run_with_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "api-perf",
            "--config-file",
            dir.path().join("absent.json").to_str().unwrap(),
        ])
        .unwrap();
        let err = run_with(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
