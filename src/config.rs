//! Run configuration loaded from `perf_config.json`.
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "Headers": {"Authorization": "Bearer abc123"},
//!   "Path_Blacklist": ["/health"],
//!   "Path_Whitelist": [],
//!   "Number_Of_Passes": 5,
//!   "Average_Threshold_For_List": 6000,
//!   "Average_Threshold_For_Object": 1500,
//!   "Average_Threshold_Exceptions": {"/api/v1/reports?full=true": 12000},
//!   "Additional_Calls": [
//!     {"path": "/search", "method": "POST", "description": "Full text", "data": "{\"q\":\"x\"}"}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "perf_config.json";
pub const DEFAULT_NUMBER_OF_PASSES: u32 = 5;
pub const DEFAULT_LIST_THRESHOLD_MS: f64 = 6000.0;
pub const DEFAULT_OBJECT_THRESHOLD_MS: f64 = 1500.0;
pub const DEFAULT_IDENTIFIER_FIELD: &str = "uuid";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors that can occur when loading the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration. Key names follow the JSON file, not Rust conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PerfConfig {
    /// Headers applied to every request (auth tokens and the like).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Paths that are never measured.
    #[serde(rename = "Path_Blacklist", default)]
    pub path_blacklist: Vec<String>,

    /// When non-empty, only paths starting with one of these prefixes are measured.
    #[serde(rename = "Path_Whitelist", default)]
    pub path_whitelist: Vec<String>,

    #[serde(rename = "Number_Of_Passes", default = "default_passes")]
    pub number_of_passes: u32,

    #[serde(
        rename = "Average_Threshold_For_List",
        default = "default_list_threshold"
    )]
    pub average_threshold_for_list: f64,

    #[serde(
        rename = "Average_Threshold_For_Object",
        default = "default_object_threshold"
    )]
    pub average_threshold_for_object: f64,

    /// Per-request overrides keyed by path-and-query (or full URL).
    #[serde(rename = "Average_Threshold_Exceptions", default)]
    pub average_threshold_exceptions: BTreeMap<String, f64>,

    /// Literal calls measured alongside the generated ones.
    #[serde(rename = "Additional_Calls", default)]
    pub additional_calls: Vec<AdditionalCall>,

    /// Name of the identifier placeholder and of the field read from list results.
    #[serde(rename = "Identifier_Field", default = "default_identifier_field")]
    pub identifier_field: String,

    #[serde(
        rename = "Request_Timeout_Seconds",
        default = "default_request_timeout"
    )]
    pub request_timeout_seconds: u64,
}

/// A hand-written call definition from `Additional_Calls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalCall {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Literal request body, sent as-is.
    #[serde(default)]
    pub data: Option<String>,
}

fn default_passes() -> u32 {
    DEFAULT_NUMBER_OF_PASSES
}

fn default_list_threshold() -> f64 {
    DEFAULT_LIST_THRESHOLD_MS
}

fn default_object_threshold() -> f64 {
    DEFAULT_OBJECT_THRESHOLD_MS
}

fn default_identifier_field() -> String {
    DEFAULT_IDENTIFIER_FIELD.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_method() -> String {
    "GET".to_string()
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            path_blacklist: Vec::new(),
            path_whitelist: Vec::new(),
            number_of_passes: DEFAULT_NUMBER_OF_PASSES,
            average_threshold_for_list: DEFAULT_LIST_THRESHOLD_MS,
            average_threshold_for_object: DEFAULT_OBJECT_THRESHOLD_MS,
            average_threshold_exceptions: BTreeMap::new(),
            additional_calls: Vec::new(),
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl PerfConfig {
    /// Load configuration from a specific path. A missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_passes == 0 {
            return Err(ConfigError::Validation(
                "Number_Of_Passes must be a positive integer".into(),
            ));
        }

        for (name, value) in [
            ("Average_Threshold_For_List", self.average_threshold_for_list),
            (
                "Average_Threshold_For_Object",
                self.average_threshold_for_object,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be a non-negative number of milliseconds"
                )));
            }
        }

        if self.identifier_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Identifier_Field cannot be empty".into(),
            ));
        }

        for call in &self.additional_calls {
            if !call.path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "Additional call path must start with '/': {}",
                    call.path
                )));
            }
        }

        Ok(())
    }

    /// The path placeholder that marks single-object endpoints, e.g. `{uuid}`.
    pub fn identifier_placeholder(&self) -> String {
        format!("{{{}}}", self.identifier_field)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
