//! Per-attempt response classification.

use serde_json::Value;
use std::time::Duration;
use tracing::{error, warn};

use super::transport::{PreparedRequest, TransportError, TransportResponse};

const NO_CONTENT: u16 = 204;
const UNAUTHORIZED: u16 = 401;
const GATEWAY_TIMEOUT: u16 = 504;

/// What one pass of a call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 2xx other than 204. `body` is `None` when it is empty or not JSON.
    Success {
        body: Option<Value>,
        elapsed: Duration,
    },
    /// 204 No Content: counts as a single empty result.
    Empty { elapsed: Duration },
    /// 504 from the gateway.
    Timeout,
    /// Any other status, or no response at all.
    Failed,
}

/// One pass's contribution to the aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timing {
    Millis(f64),
    Timeout,
    Failed,
}

impl AttemptOutcome {
    pub fn classify(
        request: &PreparedRequest,
        result: Result<TransportResponse, TransportError>,
    ) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!(
                    method = %request.method,
                    url = %request.url,
                    error = %err,
                    "API call failed"
                );
                return Self::Failed;
            }
        };

        match response.status {
            NO_CONTENT => Self::Empty {
                elapsed: response.elapsed,
            },
            200..=299 => Self::Success {
                body: parse_body(&response.body),
                elapsed: response.elapsed,
            },
            GATEWAY_TIMEOUT => Self::Timeout,
            status => {
                if status == UNAUTHORIZED {
                    warn!(url = %request.url, "Got Unauthorized response");
                }
                error!(
                    method = %request.method,
                    url = %request.url,
                    status,
                    body = %response.body,
                    "API call failed"
                );
                Self::Failed
            }
        }
    }

    /// Elapsed milliseconds; a self-reported `time` in the body wins over the
    /// transport measurement.
    pub fn timing(&self) -> Timing {
        match self {
            Self::Success { body, elapsed } => Timing::Millis(
                body.as_ref()
                    .and_then(reported_millis)
                    .unwrap_or_else(|| millis(*elapsed)),
            ),
            Self::Empty { elapsed } => Timing::Millis(millis(*elapsed)),
            Self::Timeout => Timing::Timeout,
            Self::Failed => Timing::Failed,
        }
    }

    /// Object count as reported by this attempt: the body's `count`, else 1 for
    /// a non-empty body and 0 for an empty one. -1 for TIMEOUT and FAILED.
    pub fn object_count(&self) -> i64 {
        match self {
            Self::Success { body, .. } => body.as_ref().map_or(0, |body| {
                body.get("count")
                    .and_then(Value::as_i64)
                    .unwrap_or(if is_truthy(body) { 1 } else { 0 })
            }),
            Self::Empty { .. } => 1,
            Self::Timeout | Self::Failed => -1,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Success { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    serde_json::from_str(body).ok()
}

/// The body's own timing, e.g. `"time": "12.5mS"` or `"time": 12.5`.
pub fn reported_millis(body: &Value) -> Option<f64> {
    match body.get("time")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            let number = trimmed
                .strip_suffix("mS")
                .or_else(|| trimmed.strip_suffix("ms"))
                .unwrap_or(trimmed);
            number.trim().parse().ok()
        }
        _ => None,
    }
}

/// Identifier of the first listed object, when the body lists at least one.
pub fn first_identifier(body: &Value, field: &str) -> Option<String> {
    let count = body.get("count").and_then(Value::as_i64)?;
    let first = body.get("result")?.as_array()?.first()?;
    if count <= 0 {
        return None;
    }
    match first.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn request() -> PreparedRequest {
        PreparedRequest {
            method: "GET".into(),
            url: Url::parse("http://h/api/widgets").unwrap(),
            body: None,
        }
    }

    fn response(status: u16, body: &str, ms: u64) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status,
            elapsed: Duration::from_millis(ms),
            body: body.to_string(),
        })
    }

    #[test]
    fn test_success_prefers_reported_time() {
        let outcome = AttemptOutcome::classify(
            &request(),
            response(200, r#"{"count": 3, "result": [], "time": "12.5mS"}"#, 40),
        );
        assert_eq!(outcome.timing(), Timing::Millis(12.5));
        assert_eq!(outcome.object_count(), 3);
    }

    #[test]
    fn test_success_without_time_uses_transport() {
        let outcome = AttemptOutcome::classify(&request(), response(207, r#"{"ok": true}"#, 40));
        assert_eq!(outcome.timing(), Timing::Millis(40.0));
        assert_eq!(outcome.object_count(), 1);
    }

    #[test]
    fn test_success_with_empty_or_non_json_body() {
        let empty = AttemptOutcome::classify(&request(), response(200, "", 5));
        assert_eq!(empty.object_count(), 0);
        assert_eq!(empty.timing(), Timing::Millis(5.0));

        let text = AttemptOutcome::classify(&request(), response(201, "created", 5));
        assert_eq!(text.body(), None);
        assert_eq!(text.object_count(), 0);

        let empty_list = AttemptOutcome::classify(&request(), response(200, "[]", 5));
        assert_eq!(empty_list.object_count(), 0);
    }

    #[test]
    fn test_no_content_counts_one_object() {
        let outcome = AttemptOutcome::classify(&request(), response(204, "", 7));
        assert_eq!(outcome, AttemptOutcome::Empty { elapsed: Duration::from_millis(7) });
        assert_eq!(outcome.object_count(), 1);
        assert_eq!(outcome.timing(), Timing::Millis(7.0));
    }

    #[test]
    fn test_gateway_timeout() {
        let outcome = AttemptOutcome::classify(&request(), response(504, "upstream", 30_000));
        assert_eq!(outcome, AttemptOutcome::Timeout);
        assert_eq!(outcome.timing(), Timing::Timeout);
        assert_eq!(outcome.object_count(), -1);
    }

    #[test]
    fn test_other_statuses_fail() {
        for status in [301, 400, 401, 404, 500, 503] {
            let outcome = AttemptOutcome::classify(&request(), response(status, "nope", 1));
            assert_eq!(outcome, AttemptOutcome::Failed, "status {status}");
            assert_eq!(outcome.timing(), Timing::Failed);
            assert_eq!(outcome.object_count(), -1);
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn classify_with_log(status: u16) -> (AttemptOutcome, String) {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let outcome = tracing::subscriber::with_default(subscriber, || {
            AttemptOutcome::classify(&request(), response(status, "denied", 1))
        });
        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        (outcome, text)
    }

    #[test]
    fn test_unauthorized_fails_with_warning() {
        let (outcome, log) = classify_with_log(401);
        assert_eq!(outcome, AttemptOutcome::Failed);
        assert_eq!(outcome.timing(), Timing::Failed);
        assert!(log.contains("WARN"), "{log}");
        assert!(log.contains("Got Unauthorized response"), "{log}");
        assert!(log.contains("http://h/api/widgets"), "{log}");
    }

    #[test]
    fn test_forbidden_fails_without_unauthorized_warning() {
        let (outcome, log) = classify_with_log(403);
        assert_eq!(outcome, AttemptOutcome::Failed);
        assert!(!log.contains("Unauthorized"), "{log}");
        assert!(log.contains("API call failed"), "{log}");
    }

    #[test]
    fn test_transport_error_fails() {
        let outcome = AttemptOutcome::classify(
            &request(),
            Err(TransportError::Method("BAD METHOD".into())),
        );
        assert_eq!(outcome, AttemptOutcome::Failed);
    }

    #[test]
    fn test_reported_millis_formats() {
        assert_eq!(reported_millis(&json!({"time": "3mS"})), Some(3.0));
        assert_eq!(reported_millis(&json!({"time": " 4.25 ms"})), Some(4.25));
        assert_eq!(reported_millis(&json!({"time": 9})), Some(9.0));
        assert_eq!(reported_millis(&json!({"time": "-1mS"})), Some(-1.0));
        assert_eq!(reported_millis(&json!({"time": "soon"})), None);
        assert_eq!(reported_millis(&json!({"time": null})), None);
        assert_eq!(reported_millis(&json!([1, 2])), None);
    }

    #[test]
    fn test_first_identifier() {
        let body = json!({"count": 2, "result": [{"uuid": "abc"}, {"uuid": "def"}]});
        assert_eq!(first_identifier(&body, "uuid"), Some("abc".into()));

        let numeric = json!({"count": 1, "result": [{"id": 42}]});
        assert_eq!(first_identifier(&numeric, "id"), Some("42".into()));

        assert_eq!(first_identifier(&json!({"count": 0, "result": [{"uuid": "a"}]}), "uuid"), None);
        assert_eq!(first_identifier(&json!({"count": 1, "result": []}), "uuid"), None);
        assert_eq!(first_identifier(&json!({"count": 1, "result": {"uuid": "a"}}), "uuid"), None);
        assert_eq!(first_identifier(&json!({"result": [{"uuid": "a"}]}), "uuid"), None);
        assert_eq!(first_identifier(&json!({"count": 1, "result": [{"name": "a"}]}), "uuid"), None);
    }
}
