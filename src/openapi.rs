//! The subset of an OpenAPI / Swagger document that call planning needs.
//!
//! Only `basePath`, `paths` and operation parameters are modelled. Parameters
//! may carry `type`/`enum` directly (Swagger 2) or inside `schema` (OpenAPI 3).

use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// HTTP methods recognised as operation keys inside a path item.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Error, Debug)]
pub enum OpenApiError {
    #[error("Invalid API spec URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to fetch API spec: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API spec request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse API spec: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parsed API document. Immutable once fetched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiDocument {
    #[serde(rename = "basePath", default)]
    pub base_path: String,

    /// Path -> (method or path-level key) -> raw definition.
    #[serde(default)]
    pub paths: BTreeMap<String, BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Cookie,
    Body,
    #[serde(rename = "formData")]
    FormData,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "in", default)]
    pub location: ParameterLocation,

    #[serde(rename = "type", default)]
    pub param_type: Option<String>,

    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default)]
    pub schema: Option<ParameterSchema>,

    #[serde(rename = "x-param-conflicts-with", default)]
    pub conflicts_with: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default)]
    pub schema_type: Option<String>,

    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<Value>>,
}

impl Parameter {
    pub fn is_query(&self) -> bool {
        self.location == ParameterLocation::Query && !self.name.is_empty()
    }

    /// Declared type, looking inside `schema` when the top level has none.
    pub fn declared_type(&self) -> Option<&str> {
        self.param_type
            .as_deref()
            .or_else(|| self.schema.as_ref()?.schema_type.as_deref())
    }

    /// Declared enum values rendered as query-string values.
    pub fn declared_enum(&self) -> Option<Vec<String>> {
        let values = self
            .enum_values
            .as_ref()
            .or_else(|| self.schema.as_ref()?.enum_values.as_ref())?;
        Some(values.iter().map(query_value).collect())
    }
}

/// Render a JSON enum member the way it would appear in a query string.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ApiDocument {
    pub fn from_json(content: &str) -> Result<Self, OpenApiError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Fetch and parse the document. Any non-2xx status is an error.
    pub fn fetch(client: &Client, spec_url: &str) -> Result<Self, OpenApiError> {
        debug!(
            component = "openapi",
            operation = "fetch",
            url = spec_url,
            "Loading API spec"
        );
        let response = client.get(spec_url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(OpenApiError::Status {
                url: spec_url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text()?;
        let document = Self::from_json(&body)?;
        info!(
            component = "openapi",
            operation = "fetch",
            paths = document.paths.len(),
            "Loaded API spec"
        );
        Ok(document)
    }

    /// Scheme and authority of the spec URL followed by `basePath`.
    pub fn base_url(&self, spec_url: &str) -> Result<String, OpenApiError> {
        let parsed = Url::parse(spec_url).map_err(|e| OpenApiError::InvalidUrl {
            url: spec_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(OpenApiError::InvalidUrl {
                url: spec_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(format!(
            "{}{}",
            parsed.origin().ascii_serialization(),
            self.base_path.trim_end_matches('/')
        ))
    }

    pub fn has_operation(&self, path: &str, method: &str) -> bool {
        self.paths
            .get(path)
            .is_some_and(|item| item.contains_key(method))
    }

    /// Operations declared on a path, in method-name order.
    ///
    /// Path-level keys such as `parameters` or `summary` are not operations and
    /// are skipped. A malformed operation is logged and skipped.
    pub fn operations<'a>(&'a self, path: &str) -> impl Iterator<Item = (&'a str, Operation)> + 'a {
        self.paths
            .get(path)
            .into_iter()
            .flat_map(|item| item.iter())
            .filter(|(method, _)| HTTP_METHODS.contains(&method.as_str()))
            .filter_map(move |(method, raw)| {
                match serde_json::from_value::<Operation>(raw.clone()) {
                    Ok(operation) => Some((method.as_str(), operation)),
                    Err(err) => {
                        warn!(
                            component = "openapi",
                            method = method.as_str(),
                            error = %err,
                            "Skipping malformed operation"
                        );
                        None
                    }
                }
            })
    }
}
