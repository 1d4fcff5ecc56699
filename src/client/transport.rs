//! HTTP transport
//!
//! A reqwest-backed implementation of [`ApiTransport`](super::ApiTransport).
//! Besides issuing requests it handles:
//! - Token placement (bearer header or query parameter, provider-dependent)
//! - Client-side request pacing via a token bucket
//! - Mapping non-2xx responses to classifiable errors

use super::{ApiResponse, ApiTransport};
use crate::error::{Error, Result};
use crate::types::{JsonObject, Method, StringMap};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

// ============================================================================
// Request pacing
// ============================================================================

/// Configuration for the client-side token bucket
///
/// This is a local floor under the provider's limits; the header-driven
/// [`RateGovernor`](super::RateGovernor) still reacts to what the provider
/// actually reports.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Maximum number of requests per second
    pub requests_per_second: u32,
    /// Burst size (max tokens in bucket)
    pub burst_size: u32,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

/// Token bucket pacer
#[derive(Clone)]
pub struct Pacer {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl Pacer {
    /// Create a pacer with the given config
    pub fn new(config: &PacerConfig) -> Self {
        let one = NonZeroU32::MIN;
        let quota = Quota::per_second(NonZeroU32::new(config.requests_per_second).unwrap_or(one))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(one));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").finish()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Where the access token goes on each request
#[derive(Debug, Clone)]
pub enum TokenStyle {
    /// `Authorization: Bearer <token>` header
    Bearer,
    /// Query parameter with the given name (graph-style APIs)
    QueryParam(String),
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL all paths are joined onto
    pub base_url: String,
    /// Access token
    pub access_token: String,
    /// Token placement
    pub token_style: TokenStyle,
    /// Optional version header, e.g. `("Square-Version", "2021-06-16")`
    pub version_header: Option<(String, String)>,
    /// Request timeout
    pub timeout: Duration,
    /// Request pacing, `None` to disable
    pub pacing: Option<PacerConfig>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: String::new(),
            token_style: TokenStyle::Bearer,
            version_header: None,
            timeout: Duration::from_secs(30),
            pacing: Some(PacerConfig::default()),
            user_agent: format!("tidemark/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Builder for [`HttpTransport`]
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    config: HttpTransportConfig,
}

impl HttpTransportBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the access token
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    /// Set the token placement
    pub fn token_style(mut self, style: TokenStyle) -> Self {
        self.config.token_style = style;
        self
    }

    /// Add a version header sent on every request
    pub fn version_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.version_header = Some((name.into(), value.into()));
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the pacing config
    pub fn pacing(mut self, config: PacerConfig) -> Self {
        self.config.pacing = Some(config);
        self
    }

    /// Disable request pacing
    pub fn no_pacing(mut self) -> Self {
        self.config.pacing = None;
        self
    }

    /// Build the transport
    pub fn build(self) -> Result<HttpTransport> {
        HttpTransport::with_config(self.config)
    }
}

/// reqwest-backed API transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    config: HttpTransportConfig,
    pacer: Option<Pacer>,
}

impl HttpTransport {
    /// Create a builder
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Create a transport from a config
    pub fn with_config(config: HttpTransportConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let pacer = config.pacing.as_ref().map(Pacer::new);

        Ok(Self {
            client,
            base_url,
            config,
            pacer,
        })
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("has_pacer", &self.pacer.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn call(&self, method: Method, path: &str, params: &JsonObject) -> Result<ApiResponse> {
        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }

        let url = self.build_url(path)?;
        let mut req = self.client.request(method.into(), url.clone());

        match &self.config.token_style {
            TokenStyle::Bearer => req = req.bearer_auth(&self.config.access_token),
            TokenStyle::QueryParam(name) => {
                req = req.query(&[(name.as_str(), self.config.access_token.as_str())]);
            }
        }

        if let Some((name, value)) = &self.config.version_header {
            req = req.header(name.as_str(), value.as_str());
        }

        match method {
            Method::GET | Method::DELETE => {
                let pairs = query_pairs(params);
                if !pairs.is_empty() {
                    req = req.query(&pairs);
                }
            }
            _ => req = req.json(&Value::Object(params.clone())),
        }

        let response = req.send().await?;
        let status = response.status();
        let headers: StringMap = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text));
        }

        debug!(%url, status = status.as_u16(), "Request succeeded");

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| Error::decode(format!("Response body is not JSON: {e}")))?
        };

        Ok(ApiResponse { body, headers })
    }
}

/// Flatten params into query pairs
///
/// Scalar values are rendered bare (no JSON quoting); arrays become
/// comma-separated lists, the convention graph-style APIs expect for
/// `fields` and `metric` parameters.
fn query_pairs(params: &JsonObject) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| scalar_string(value).map(|v| (key.clone(), v)))
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_string).collect();
            Some(parts.join(","))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Map a non-2xx response body to a classifiable error
///
/// Graph-style bodies carry `{"error": {code, error_subcode, message,
/// is_transient}}` and become [`Error::Api`]; anything else stays an
/// [`Error::HttpStatus`] with the raw body preserved.
fn parse_error_body(status: u16, body: &str) -> Error {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(err) = value.get("error") {
            if let Some(code) = err.get("code").and_then(Value::as_i64) {
                return Error::Api {
                    code,
                    subcode: err.get("error_subcode").and_then(Value::as_i64),
                    message: err
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    transient: err
                        .get("is_transient")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                };
            }
        }
        if let Some(errors) = value.get("errors") {
            return Error::http_status(status, errors.to_string());
        }
    }
    Error::http_status(status, body.to_string())
}

#[cfg(test)]
mod transport_tests {
    use super::*;

    #[test]
    fn test_query_pairs_flattening() {
        let mut params = JsonObject::new();
        params.insert("limit".into(), serde_json::json!(100));
        params.insert(
            "metric".into(),
            serde_json::json!(["impressions", "reach"]),
        );
        params.insert("since".into(), serde_json::json!("2021-01-01 00:00:00"));
        params.insert("skip_me".into(), Value::Null);

        let pairs = query_pairs(&params);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("limit".to_string(), "100".to_string())));
        assert!(pairs.contains(&("metric".to_string(), "impressions,reach".to_string())));
        assert!(pairs.contains(&("since".to_string(), "2021-01-01 00:00:00".to_string())));
    }

    #[test]
    fn test_parse_error_body_graph_shape() {
        let body = r#"{"error": {"code": 100, "error_subcode": 2108006, "message": "too old", "is_transient": false}}"#;
        let err = parse_error_body(400, body);
        assert_eq!(err.api_error_code(), Some(100));
        assert_eq!(err.api_error_subcode(), Some(2_108_006));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_error_body_transient() {
        let body = r#"{"error": {"code": 2, "message": "please retry", "is_transient": true}}"#;
        let err = parse_error_body(500, body);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_error_body_fallback() {
        let err = parse_error_body(503, "upstream unavailable");
        assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
