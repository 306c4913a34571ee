//! Execution and timing of a call plan.
//!
//! Calls run strictly one after another, each `num_passes` times. Run state
//! (the identifier cache and the result rows) lives in a [`RunContext`] owned
//! by the caller, so the same runner can execute several plans.

pub mod outcome;
pub mod transport;

use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

use crate::config::PerfConfig;
use crate::plan::{ApiCall, CallKind, CallPlan, single_object_path};
use crate::report::{LatencyStats, ResultRow, Status};

use self::outcome::{AttemptOutcome, Timing, first_identifier};
use self::transport::{PreparedRequest, Transport};

/// Settings the runner reads from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub num_passes: u32,
    pub list_threshold_ms: f64,
    pub object_threshold_ms: f64,
    pub threshold_exceptions: BTreeMap<String, f64>,
    pub identifier_field: String,
    pub dry_run: bool,
}

impl RunSettings {
    pub fn from_config(config: &PerfConfig, dry_run: bool) -> Self {
        Self {
            num_passes: config.number_of_passes,
            list_threshold_ms: config.average_threshold_for_list,
            object_threshold_ms: config.average_threshold_for_object,
            threshold_exceptions: config.average_threshold_exceptions.clone(),
            identifier_field: config.identifier_field.clone(),
            dry_run,
        }
    }

    fn placeholder(&self) -> String {
        format!("{{{}}}", self.identifier_field)
    }

    /// Token substituted for the identifier when nothing is executed.
    fn dry_run_token(&self) -> String {
        format!("_{}_", self.identifier_field)
    }

    /// Override keyed by path-and-query, then by full URL.
    fn threshold_exception(&self, request: &PreparedRequest) -> Option<f64> {
        self.threshold_exceptions
            .get(&request.path_and_query())
            .or_else(|| self.threshold_exceptions.get(request.url.as_str()))
            .copied()
    }

    fn threshold_for(&self, kind: CallKind, request: &PreparedRequest) -> f64 {
        self.threshold_exception(request).unwrap_or(match kind {
            CallKind::ObjectList => self.list_threshold_ms,
            CallKind::SingleObject => self.object_threshold_ms,
        })
    }
}

/// Mutable state for one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    identifiers: HashMap<String, String>,
    results: Vec<ResultRow>,
    skipped: Vec<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached identifier for a single-object path template.
    pub fn identifier(&self, template: &str) -> Option<&str> {
        self.identifiers.get(template).map(String::as_str)
    }

    pub fn results(&self) -> &[ResultRow] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ResultRow> {
        self.results
    }

    /// Single-object paths skipped for lack of an identifier.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// First write wins; identifiers are never refreshed within a run.
    fn cache_identifier(&mut self, template: String, identifier: String) {
        self.identifiers.entry(template).or_insert(identifier);
    }
}

/// How the passes of one call ended up, before classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Failed,
    Timeout,
    Measured(LatencyStats),
}

/// Any FAILED pass fails the call; otherwise any TIMEOUT times it out.
pub fn aggregate(timings: &[Timing]) -> Aggregate {
    if timings.contains(&Timing::Failed) {
        return Aggregate::Failed;
    }
    if timings.contains(&Timing::Timeout) {
        return Aggregate::Timeout;
    }
    let samples: Vec<f64> = timings
        .iter()
        .filter_map(|t| match t {
            Timing::Millis(ms) => Some(*ms),
            _ => None,
        })
        .collect();
    LatencyStats::from_samples(&samples).map_or(Aggregate::Failed, Aggregate::Measured)
}

/// OK when the mean is at or below the threshold.
pub fn classify(stats: &LatencyStats, threshold_ms: f64) -> Status {
    if stats.avg_ms <= threshold_ms {
        Status::Ok
    } else {
        Status::Slow
    }
}

/// Percent-encode an identifier as a single path segment. `.` and `..` would
/// be collapsed by URL normalisation, so they have no encoding.
pub fn path_segment(identifier: &str) -> Option<String> {
    match identifier {
        "" | "." | ".." => None,
        _ => Some(urlencoding::encode(identifier).into_owned()),
    }
}

pub struct Runner<T> {
    transport: T,
    base_url: String,
    settings: RunSettings,
}

impl<T: Transport> Runner<T> {
    pub fn new(transport: T, base_url: impl Into<String>, settings: RunSettings) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            settings,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn run(&self, plan: &CallPlan, ctx: &mut RunContext) {
        let qualifier = if self.settings.dry_run { "would" } else { "will" };
        info!(
            "Each API call {} be executed {} time(s)",
            qualifier, self.settings.num_passes
        );

        for call in &plan.calls {
            self.execute(plan, call, ctx);
        }

        info!(
            component = "runner",
            results = ctx.results.len(),
            skipped = ctx.skipped.len(),
            "Run complete"
        );
    }

    /// Resolve, dispatch, aggregate and record one call.
    pub fn execute(&self, plan: &CallPlan, call: &ApiCall, ctx: &mut RunContext) {
        let Some(path) = self.resolve_path(call, ctx) else {
            warn!(path = %call.path, "Could not get an identifier; skipping");
            ctx.skipped.push(call.path.clone());
            return;
        };

        let request = match self.prepare(call, &path) {
            Ok(request) => request,
            Err(err) => {
                error!(path = %path, error = %err, "Could not build request URL");
                ctx.results.push(ResultRow {
                    label: format!("{} {}", call.method, path),
                    description: call.description.clone().unwrap_or_default(),
                    objects: -1,
                    status: Status::Failed,
                    latency: Some(LatencyStats::sentinel()),
                });
                return;
            }
        };

        let label = request.label();
        let mut description = call.description.clone().unwrap_or_default();
        if let Some(threshold) = self.settings.threshold_exception(&request) {
            if !description.is_empty() {
                description.push('\n');
            }
            description.push_str(&format!("Threshold: {threshold}"));
        }
        debug!(label = %label, "Processing calls");

        let row = if self.settings.dry_run {
            ResultRow {
                label,
                description,
                objects: 0,
                status: Status::DryRun,
                latency: None,
            }
        } else {
            let (objects, timings) = self.measure(plan, call, &request, ctx);
            let (status, latency) = match aggregate(&timings) {
                Aggregate::Failed => (Status::Failed, LatencyStats::sentinel()),
                Aggregate::Timeout => (Status::Timeout, LatencyStats::sentinel()),
                Aggregate::Measured(stats) => {
                    let threshold = self.settings.threshold_for(call.kind, &request);
                    (classify(&stats, threshold), stats)
                }
            };
            ResultRow {
                label,
                description,
                objects,
                status,
                latency: Some(latency),
            }
        };

        debug!(row = ?row, "Recorded result");
        ctx.results.push(row);
    }

    /// Issue the passes; returns the first pass's object count and every timing.
    fn measure(
        &self,
        plan: &CallPlan,
        call: &ApiCall,
        request: &PreparedRequest,
        ctx: &mut RunContext,
    ) -> (i64, Vec<Timing>) {
        let mut objects = 0;
        let mut timings = Vec::with_capacity(self.settings.num_passes as usize);

        for pass in 0..self.settings.num_passes {
            let outcome = AttemptOutcome::classify(request, self.transport.send(request));

            if pass == 0 {
                objects = outcome.object_count();
                if self.caches_identifier(plan, call)
                    && let Some(identifier) = outcome
                        .body()
                        .and_then(|body| first_identifier(body, &self.settings.identifier_field))
                {
                    let template = single_object_path(&call.path, &self.settings.placeholder());
                    debug!(template = %template, identifier = %identifier, "Cached identifier");
                    ctx.cache_identifier(template, identifier);
                }
            }

            timings.push(outcome.timing());
        }

        (objects, timings)
    }

    /// Only the parameterless GET of an indexable list path seeds the cache.
    fn caches_identifier(&self, plan: &CallPlan, call: &ApiCall) -> bool {
        call.method == "GET" && call.params.is_empty() && plan.is_indexable(&call.path)
    }

    /// Path with the identifier substituted; `None` when it is not known yet.
    fn resolve_path(&self, call: &ApiCall, ctx: &RunContext) -> Option<String> {
        if !call.is_single_object() {
            return Some(call.path.clone());
        }
        let placeholder = self.settings.placeholder();
        if self.settings.dry_run {
            return Some(call.path.replace(&placeholder, &self.settings.dry_run_token()));
        }
        let identifier = ctx.identifier(&call.path)?;
        let Some(segment) = path_segment(identifier) else {
            warn!(path = %call.path, identifier, "Identifier is not a usable path segment");
            return None;
        };
        Some(call.path.replace(&placeholder, &segment))
    }

    fn prepare(&self, call: &ApiCall, path: &str) -> anyhow::Result<PreparedRequest> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        if !call.params.is_empty() {
            url.query_pairs_mut().extend_pairs(call.params.iter());
        }
        Ok(PreparedRequest {
            method: call.method.clone(),
            url,
            body: call.data.clone(),
        })
    }
}
