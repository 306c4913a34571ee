//! Call plan construction.
//!
//! Walks the API document in path order, filters paths, expands each GET
//! operation's optional query parameters into concrete calls and returns them
//! sorted by path. Sorting by path puts `/widgets` ahead of `/widgets/{uuid}`,
//! so a list call has always run (and cached an identifier) before the
//! single-object calls that need it.

pub mod combos;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::config::{AdditionalCall, PerfConfig};
use crate::openapi::{ApiDocument, Operation};

pub use combos::{Assignment, ParamIndex, ParamSpec};

/// Whether a call targets a collection or a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    ObjectList,
    SingleObject,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectList => write!(f, "object_list"),
            Self::SingleObject => write!(f, "single_object"),
        }
    }
}

/// One planned call. The path is still a template for single-object calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiCall {
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    pub params: Assignment,
    pub kind: CallKind,
    pub description: Option<String>,
    /// Literal request body.
    pub data: Option<String>,
}

impl ApiCall {
    pub fn new(path: impl Into<String>, method: &str, kind: CallKind) -> Self {
        Self {
            path: path.into(),
            method: method.to_uppercase(),
            params: Assignment::new(),
            kind,
            description: None,
            data: None,
        }
    }

    pub fn with_params(mut self, params: Assignment) -> Self {
        self.params = params;
        self
    }

    pub fn is_single_object(&self) -> bool {
        self.kind == CallKind::SingleObject
    }
}

/// Blacklist / whitelist path filtering.
///
/// Blacklist entries match exactly and always win. Whitelist entries are
/// prefixes; an empty whitelist allows everything.
#[derive(Debug, Clone, Copy)]
pub struct PathFilter<'a> {
    blacklist: &'a [String],
    whitelist: &'a [String],
}

impl<'a> PathFilter<'a> {
    pub fn new(blacklist: &'a [String], whitelist: &'a [String]) -> Self {
        Self {
            blacklist,
            whitelist,
        }
    }

    pub fn from_config(config: &'a PerfConfig) -> Self {
        Self::new(&config.path_blacklist, &config.path_whitelist)
    }

    pub fn is_blacklisted(&self, path: &str) -> bool {
        self.blacklist.iter().any(|entry| entry == path)
    }

    pub fn allows(&self, path: &str) -> bool {
        if self.is_blacklisted(path) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Ordered calls plus the list paths whose first result identifier is cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPlan {
    pub calls: Vec<ApiCall>,
    pub indexable: BTreeSet<String>,
}

impl CallPlan {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn is_indexable(&self, path: &str) -> bool {
        self.indexable.contains(path)
    }
}

/// Builds a [`CallPlan`] from an API document and the run configuration.
pub struct PlanBuilder<'a> {
    document: &'a ApiDocument,
    filter: PathFilter<'a>,
    additional_calls: &'a [AdditionalCall],
    placeholder: String,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(document: &'a ApiDocument, config: &'a PerfConfig) -> Self {
        Self {
            document,
            filter: PathFilter::from_config(config),
            additional_calls: &config.additional_calls,
            placeholder: config.identifier_placeholder(),
        }
    }

    /// Path of the single-object sibling of a list path, e.g. `/widgets/{uuid}`.
    pub fn single_object_path(&self, list_path: &str) -> String {
        single_object_path(list_path, &self.placeholder)
    }

    fn kind_of(&self, path: &str) -> CallKind {
        if path.contains(self.placeholder.as_str()) {
            CallKind::SingleObject
        } else {
            CallKind::ObjectList
        }
    }

    /// True when the path holds a template other than the identifier
    /// placeholder; nothing can fill it in, so it is never measured.
    fn has_unresolved_template(&self, path: &str) -> bool {
        path.replace(self.placeholder.as_str(), "").contains('{')
    }

    fn is_indexable(&self, path: &str) -> bool {
        !path.contains(self.placeholder.as_str())
            && !self.filter.is_blacklisted(path)
            && self
                .document
                .has_operation(&self.single_object_path(path), "get")
    }

    pub fn build(&self) -> CallPlan {
        let mut plan = CallPlan::default();

        for path in self.document.paths.keys() {
            if !self.filter.allows(path) {
                debug!(component = "plan", path = %path, "skipping path");
                continue;
            }
            if self.has_unresolved_template(path) {
                debug!(component = "plan", path = %path, "skipping path with unresolved template");
                continue;
            }

            for (method, operation) in self.document.operations(path) {
                if method != "get" {
                    continue;
                }

                if self.is_indexable(path) {
                    plan.indexable.insert(path.clone());
                }

                debug!(
                    component = "plan",
                    method = %method.to_uppercase(),
                    path = %path,
                    "Processing definition of endpoint"
                );
                let index = query_param_index(&operation);
                let kind = self.kind_of(path);
                for params in combos::assignments(&index) {
                    let call = ApiCall::new(path.as_str(), method, kind).with_params(params);
                    debug!(component = "plan", path = %call.path, params = ?call.params, "Adding call");
                    plan.calls.push(call);
                }
            }
        }

        for extra in self.additional_calls {
            if !self.filter.allows(&extra.path) || self.has_unresolved_template(&extra.path) {
                debug!(component = "plan", path = %extra.path, "skipping path from additional call");
                continue;
            }
            let mut call = ApiCall::new(extra.path.as_str(), &extra.method, self.kind_of(&extra.path))
                .with_params(extra.params.clone());
            call.description = extra.description.clone();
            call.data = extra.data.clone();
            plan.calls.push(call);
        }

        // Stable: calls sharing a path keep their generation order.
        plan.calls.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            component = "plan",
            calls = plan.calls.len(),
            indexable = plan.indexable.len(),
            "Built call plan"
        );
        plan
    }
}

pub fn single_object_path(list_path: &str, placeholder: &str) -> String {
    format!("{list_path}/{placeholder}")
}

/// Optional query parameters of an operation, as generator input.
///
/// Booleans are exercised with `true` only; enumerations with each declared
/// value. Other query parameters have no finite value set and are left out.
pub fn query_param_index(operation: &Operation) -> ParamIndex {
    let mut index = ParamIndex::new();
    for param in operation.parameters.iter().filter(|p| p.is_query()) {
        let values = if param.declared_type() == Some("boolean") {
            vec!["true".to_string()]
        } else if let Some(values) = param.declared_enum() {
            values
        } else {
            continue;
        };
        index.insert(
            param.name.clone(),
            ParamSpec::new(values).conflicting_with(param.conflicts_with.iter().cloned()),
        );
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "basePath": "/api/v1",
        "paths": {
            "/widgets/{uuid}": {"get": {}, "delete": {}},
            "/widgets": {
                "get": {"parameters": [
                    {"name": "active", "in": "query", "type": "boolean",
                     "x-param-conflicts-with": ["status"]},
                    {"name": "status", "in": "query", "type": "string", "enum": ["x", "y"]},
                    {"name": "q", "in": "query", "type": "string"}
                ]},
                "post": {}
            },
            "/gadgets": {"get": {}},
            "/gadgets/{uuid}": {"put": {}},
            "/health": {"get": {}}
        }
    }"#;

    fn doc() -> ApiDocument {
        ApiDocument::from_json(DOC).unwrap()
    }

    fn build(config: &PerfConfig) -> CallPlan {
        let document = doc();
        PlanBuilder::new(&document, config).build()
    }

    fn paths(plan: &CallPlan) -> Vec<&str> {
        plan.calls.iter().map(|c| c.path.as_str()).collect()
    }

    #[test]
    fn test_builds_get_calls_sorted_by_path() {
        let plan = build(&PerfConfig::default());
        assert_eq!(
            paths(&plan),
            vec![
                "/gadgets",
                "/health",
                "/widgets",
                "/widgets",
                "/widgets",
                "/widgets",
                "/widgets/{uuid}",
            ]
        );
        assert!(plan.calls.iter().all(|c| c.method == "GET"));
        assert!(plan.calls.windows(2).all(|w| w[0].path <= w[1].path));
    }

    #[test]
    fn test_widget_parameter_combinations() {
        let plan = build(&PerfConfig::default());
        let widget_params: Vec<_> = plan
            .calls
            .iter()
            .filter(|c| c.path == "/widgets")
            .map(|c| c.params.clone())
            .collect();
        assert_eq!(
            widget_params,
            vec![
                Assignment::new(),
                Assignment::from([("active".to_string(), "true".to_string())]),
                Assignment::from([("status".to_string(), "x".to_string())]),
                Assignment::from([("status".to_string(), "y".to_string())]),
            ]
        );
    }

    #[test]
    fn test_call_kinds_follow_path_shape() {
        let plan = build(&PerfConfig::default());
        for call in &plan.calls {
            let expected = if call.path.contains("{uuid}") {
                CallKind::SingleObject
            } else {
                CallKind::ObjectList
            };
            assert_eq!(call.kind, expected, "{}", call.path);
        }
    }

    #[test]
    fn test_indexable_requires_get_on_single_object_path() {
        let plan = build(&PerfConfig::default());
        assert!(plan.is_indexable("/widgets"));
        // `/gadgets/{uuid}` exists but has no GET.
        assert!(!plan.is_indexable("/gadgets"));
        assert!(!plan.is_indexable("/health"));
        assert!(!plan.is_indexable("/widgets/{uuid}"));
    }

    #[test]
    fn test_blacklist_excludes_exact_path() {
        let config = PerfConfig {
            path_blacklist: vec!["/widgets".into()],
            ..Default::default()
        };
        let plan = build(&config);
        assert!(!paths(&plan).contains(&"/widgets"));
        assert!(paths(&plan).contains(&"/widgets/{uuid}"));
        assert!(!plan.is_indexable("/widgets"));
    }

    #[test]
    fn test_whitelist_limits_to_prefixes() {
        let config = PerfConfig {
            path_whitelist: vec!["/widgets".into()],
            ..Default::default()
        };
        let plan = build(&config);
        assert!(paths(&plan).iter().all(|p| p.starts_with("/widgets")));
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_blacklist_beats_whitelist() {
        let config = PerfConfig {
            path_blacklist: vec!["/widgets/{uuid}".into()],
            path_whitelist: vec!["/widgets".into()],
            ..Default::default()
        };
        let plan = build(&config);
        assert!(paths(&plan).iter().all(|p| *p == "/widgets"));
        // The list path survives but its single-object sibling is gone from
        // the plan, not from the document, so it remains indexable.
        assert!(plan.is_indexable("/widgets"));
    }

    #[test]
    fn test_building_twice_is_identical() {
        let config = PerfConfig::default();
        let document = doc();
        let first = PlanBuilder::new(&document, &config).build();
        let second = PlanBuilder::new(&document, &config).build();
        assert_eq!(first, second);
    }

    #[test]
    fn test_additional_calls_are_filtered_and_sorted() {
        let config: PerfConfig = PerfConfig::from_json(
            r#"{
                "Path_Blacklist": ["/hidden"],
                "Additional_Calls": [
                    {"path": "/aardvarks", "method": "post", "description": "Create", "data": "{\"a\":1}"},
                    {"path": "/hidden"},
                    {"path": "/widgets/{uuid}", "params": {"expand": "all"}}
                ]
            }"#,
        )
        .unwrap();
        let plan = build(&config);

        let first = &plan.calls[0];
        assert_eq!(first.path, "/aardvarks");
        assert_eq!(first.method, "POST");
        assert_eq!(first.kind, CallKind::ObjectList);
        assert_eq!(first.description.as_deref(), Some("Create"));
        assert_eq!(first.data.as_deref(), Some("{\"a\":1}"));

        assert!(!paths(&plan).contains(&"/hidden"));

        let extra = plan.calls.last().unwrap();
        assert_eq!(extra.path, "/widgets/{uuid}");
        assert_eq!(extra.kind, CallKind::SingleObject);
        assert_eq!(extra.params["expand"], "all");
    }

    #[test]
    fn test_custom_identifier_placeholder() {
        let document = ApiDocument::from_json(
            r#"{"paths": {"/users": {"get": {}}, "/users/{id}": {"get": {}}}}"#,
        )
        .unwrap();
        let config = PerfConfig {
            identifier_field: "id".into(),
            ..Default::default()
        };
        let plan = PlanBuilder::new(&document, &config).build();
        assert!(plan.is_indexable("/users"));
        assert_eq!(plan.calls[1].kind, CallKind::SingleObject);
    }

    #[test]
    fn test_paths_with_other_templates_are_skipped() {
        let document = ApiDocument::from_json(
            r#"{"paths": {
                "/users": {"get": {}},
                "/users/{userId}/widgets": {"get": {}},
                "/users/{userId}/widgets/{uuid}": {"get": {}},
                "/users/{uuid}": {"get": {}}
            }}"#,
        )
        .unwrap();
        let config: PerfConfig = serde_json::from_str(
            r#"{"Additional_Calls": [{"path": "/orgs/{orgId}"}, {"path": "/users/{uuid}"}]}"#,
        )
        .unwrap();
        let plan = PlanBuilder::new(&document, &config).build();
        assert_eq!(
            paths(&plan),
            vec!["/users", "/users/{uuid}", "/users/{uuid}"]
        );
    }

    #[test]
    fn test_query_param_index_skips_unbounded_parameters() {
        let document = doc();
        let (_, get) = document
            .operations("/widgets")
            .find(|(m, _)| *m == "get")
            .unwrap();
        let index = query_param_index(&get);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["active", "status"]);
        assert!(index["active"].conflicts.contains("status"));
        assert_eq!(index["status"].values, vec!["x", "y"]);
    }

    #[test]
    fn test_path_filter() {
        let black = vec!["/a".to_string()];
        let white = vec!["/a".to_string(), "/b".to_string()];
        let filter = PathFilter::new(&black, &white);
        assert!(!filter.allows("/a"));
        assert!(filter.allows("/a/{uuid}"));
        assert!(filter.allows("/bee"));
        assert!(!filter.allows("/c"));

        let open = PathFilter::new(&[], &[]);
        assert!(open.allows("/anything"));
    }
}
