//! HTTP transport used by the runner.
//!
//! The [`Transport`] trait is the seam between timing logic and the network:
//! the runner only sees a status, an elapsed duration and a body.

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid HTTP method '{0}'")]
    Method(String),

    #[error("invalid header '{name}': {reason}")]
    Header { name: String, reason: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A fully resolved request, ready to be sent any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: Url,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// Path plus query string, without scheme and authority.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// `METHOD /path?query`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path_and_query())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Time until the response headers arrived.
    pub elapsed: Duration,
    pub body: String,
}

pub trait Transport {
    fn send(&self, request: &PreparedRequest) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &PreparedRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking reqwest client with the configured headers on every request.
/// Certificate verification is disabled.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(headers: &BTreeMap<String, String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .default_headers(header_map(headers)?)
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &PreparedRequest) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Method(request.method.clone()))?;

        let mut builder = self.client.request(method, request.url.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send()?;
        let elapsed = started.elapsed();
        let status = response.status().as_u16();
        let body = response.text()?;

        debug!(
            component = "transport",
            url = %request.url,
            status,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Received response"
        );
        Ok(TransportResponse {
            status,
            elapsed,
            body,
        })
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::Header {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| TransportError::Header {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_includes_query() {
        let request = PreparedRequest {
            method: "GET".into(),
            url: Url::parse("http://localhost:8080/api/v1/widgets?active=true&status=x").unwrap(),
            body: None,
        };
        assert_eq!(request.path_and_query(), "/api/v1/widgets?active=true&status=x");
        assert_eq!(request.label(), "GET /api/v1/widgets?active=true&status=x");
    }

    #[test]
    fn test_label_without_query() {
        let request = PreparedRequest {
            method: "DELETE".into(),
            url: Url::parse("https://example.com/a/b").unwrap(),
            body: None,
        };
        assert_eq!(request.label(), "DELETE /a/b");
    }

    #[test]
    fn test_header_map_rejects_invalid_names() {
        let mut headers = BTreeMap::new();
        headers.insert("Bad Header".to_string(), "x".to_string());
        assert!(matches!(
            header_map(&headers),
            Err(TransportError::Header { .. })
        ));

        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let map = header_map(&headers).unwrap();
        assert_eq!(map["authorization"], "Bearer t");
    }
}
