//! Authenticated HTTP client for the Feature.fm API
//!
//! Every call goes through [`ApiClient::execute`], which applies the write
//! gate, validates the endpoint, attaches credentials and then drives the
//! retry loop. Network problems never surface as `Err`; they come back as
//! an unsuccessful [`Outcome`] carrying a [`FailureReason`].

pub mod auth;
pub mod method;

pub use method::HttpMethod;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::common::config::HttpSettings;
use crate::common::redact::{sanitize_headers, truncate_text, Redactor};
use crate::common::{Config, Error, Result};

/// Timeout for the upstream health probe
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry behaviour for a single call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for timeouts and connection failures
    pub attempts: u32,
    pub backoff_base: Duration,
    /// Wait used when a 429 has no usable `Retry-After`
    pub default_retry_after: Duration,
    pub max_rate_limit_waits: u32,
}

impl RetryPolicy {
    pub fn from_settings(http: &HttpSettings) -> Self {
        Self {
            attempts: http.retries.max(1),
            backoff_base: Duration::from_millis(http.backoff_base_ms),
            default_retry_after: Duration::from_secs(http.default_retry_after_secs),
            max_rate_limit_waits: http.max_rate_limit_waits,
        }
    }

    /// `base * 2^attempt`, with `attempt` counted from zero
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Knobs that tests and the server tune independently of the config file
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Non-JSON bodies are cut to this many characters
    pub response_text_limit: usize,
    pub header_preview_len: usize,
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        let settings = &config.settings;
        Self {
            request_timeout: Duration::from_secs(settings.http.request_timeout_secs),
            retry: RetryPolicy::from_settings(&settings.http),
            response_text_limit: settings.output.response_text_limit,
            header_preview_len: settings.output.header_preview_len,
        }
    }
}

/// Why a call did not produce a usable response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Connection(String),
    RateLimited,
    /// Upstream answered outside `[200, 400)`
    Http(u16),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Connection(msg) => write!(f, "connection_error: {}", msg),
            FailureReason::RateLimited => write!(f, "rate_limited"),
            FailureReason::Http(_) => write!(f, "http_status"),
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What was sent, with secrets masked
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestSummary {
    pub headers: BTreeMap<String, String>,
    pub data: Option<Value>,
    pub params: Option<Value>,
}

/// Normalized result of one `execute` call
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub url: String,
    pub method: HttpMethod,
    pub status_code: Option<u16>,
    pub data: Value,
    /// Attempts counted against the retry budget
    pub attempts: u32,
    /// Total 429 waits over the whole call
    pub rate_limit_waits: u32,
    pub elapsed_ms: u64,
    pub error: Option<FailureReason>,
    pub request: RequestSummary,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub record: ResponseRecord,
}

/// Which base URL an endpoint is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiBase {
    /// `{base_url}/{endpoint}`
    #[default]
    Root,
    /// `{manage_base}/{endpoint}`, except `v2/` and `manage/` paths which
    /// already carry their prefix
    Manage,
}

impl ApiBase {
    pub fn resolve<'a>(&self, config: &'a Config, endpoint: &str) -> &'a str {
        let trimmed = endpoint.strip_prefix('/').unwrap_or(endpoint);
        match self {
            ApiBase::Manage if !(trimmed.starts_with("v2/") || trimmed.starts_with("manage/")) => {
                &config.manage_base
            }
            _ => &config.base_url,
        }
    }
}

/// Arguments to [`ApiClient::execute`]
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub endpoint: String,
    pub base: ApiBase,
    pub method: HttpMethod,
    pub payload: Option<Value>,
    pub query: Vec<(String, String)>,
    pub use_jwt: bool,
    pub use_hmac: bool,
    /// Overrides [`RetryPolicy::attempts`] for this call
    pub attempts: Option<u32>,
}

impl ExecuteRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            base: ApiBase::Root,
            method,
            payload: None,
            query: Vec::new(),
            use_jwt: false,
            use_hmac: false,
            attempts: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn base(mut self, base: ApiBase) -> Self {
        self.base = base;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn jwt(mut self, use_jwt: bool) -> Self {
        self.use_jwt = use_jwt;
        self
    }

    pub fn hmac(mut self, use_hmac: bool) -> Self {
        self.use_hmac = use_hmac;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}

/// Reachability of the upstream API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Connected,
    Error,
    Disconnected,
}

/// Join a base URL and an endpoint, refusing anything that could escape the base
pub fn build_url(base: &str, endpoint: &str) -> Result<String> {
    let trimmed = endpoint.strip_prefix('/').unwrap_or(endpoint);

    let invalid = trimmed.is_empty()
        || trimmed.contains("..")
        || trimmed.contains("//")
        || trimmed.contains('\\')
        || trimmed.contains("://")
        || trimmed.chars().any(char::is_control);

    if invalid {
        return Err(Error::InvalidEndpoint(endpoint.escape_debug().to_string()));
    }

    Ok(format!("{}/{}", base.trim_end_matches('/'), trimmed))
}

/// Parse `Retry-After` as delta-seconds or an HTTP-date
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Decode a body as JSON, wrapping anything else as `{"raw_response": ...}`
pub fn parse_body(text: &str, limit: usize) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text)
        .unwrap_or_else(|_| json!({ "raw_response": truncate_text(text, limit) }))
}

/// Flatten a JSON object into query pairs
fn payload_to_query(payload: &Value) -> Vec<(String, String)> {
    match payload {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

enum Attempt {
    Response(reqwest::Response),
    Retryable(FailureReason),
    Fatal(FailureReason),
}

/// Client for the Feature.fm API
pub struct ApiClient {
    http: reqwest::Client,
    config: Config,
    options: ClientOptions,
    redactor: Redactor,
    tested: Mutex<BTreeSet<String>>,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self> {
        let options = ClientOptions::from_config(&config);
        Self::with_options(config, options)
    }

    pub fn with_options(config: Config, options: ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(config.settings.http.user_agent.clone())
            .build()?;

        let redactor = Redactor::new(&config.credentials);

        Ok(Self {
            http,
            config,
            options,
            redactor,
            tested: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Distinct URLs contacted since the last reset
    pub fn tested_endpoints(&self) -> Vec<String> {
        self.tested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn reset_tested(&self) {
        self.tested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Issue one logical call, retrying as the policy allows
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<Outcome> {
        if request.method.is_write() {
            self.config.require_write_permission(&format!(
                "{} {}",
                request.method, request.endpoint
            ))?;
        }

        let base = request.base.resolve(&self.config, &request.endpoint);
        let url = build_url(base, &request.endpoint)?;
        self.tested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.clone());

        let body = if request.method.has_body() {
            request.payload.clone()
        } else {
            None
        };

        let mut query = request.query.clone();
        if request.method == HttpMethod::Get {
            if let Some(payload) = &request.payload {
                query.extend(payload_to_query(payload));
            }
        }

        let header_list = self.outbound_headers(request, &url, body.as_ref())?;
        let summary = RequestSummary {
            headers: sanitize_headers(
                header_list.iter().map(|(k, v)| (*k, v.as_str())),
                self.options.header_preview_len,
            ),
            data: body.clone(),
            params: if query.is_empty() {
                None
            } else {
                Some(Value::Object(
                    query
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                ))
            },
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &header_list {
            let value = HeaderValue::from_str(value).map_err(|_| {
                Error::Configuration(format!("Header {} contains invalid characters", name))
            })?;
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Internal(format!("Invalid header name {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let policy = &self.options.retry;
        let max_attempts = request.attempts.unwrap_or(policy.attempts).max(1);
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut waits = 0u32;
        // Reset whenever an attempt gets past the rate limiter
        let mut consecutive_waits = 0u32;

        let mut record = ResponseRecord {
            url: url.clone(),
            method: request.method,
            status_code: None,
            data: Value::Null,
            attempts: 0,
            rate_limit_waits: 0,
            elapsed_ms: 0,
            error: None,
            request: summary,
        };

        let response = loop {
            tracing::debug!(method = %request.method, url = %url, attempt = attempts + 1, "Sending request");

            let mut builder = self
                .http
                .request(request.method.to_reqwest_method(), &url)
                .headers(headers.clone());
            if !query.is_empty() {
                builder = builder.query(&query);
            }
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            match self.classify(builder.send().await) {
                Attempt::Response(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if consecutive_waits >= policy.max_rate_limit_waits {
                        tracing::warn!(url = %url, waits, "Still rate limited, giving up");
                        record.status_code = Some(429);
                        record.error = Some(FailureReason::RateLimited);
                        break None;
                    }
                    let delay = resp
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| parse_retry_after(v, Utc::now()))
                        .unwrap_or(policy.default_retry_after);
                    waits += 1;
                    consecutive_waits += 1;
                    tracing::warn!(url = %url, delay_ms = delay.as_millis() as u64, "Rate limited, waiting");
                    tokio::time::sleep(delay).await;
                }
                Attempt::Response(resp) => {
                    attempts += 1;
                    break Some(resp);
                }
                Attempt::Retryable(reason) => {
                    attempts += 1;
                    consecutive_waits = 0;
                    if attempts >= max_attempts {
                        tracing::warn!(url = %url, attempts, reason = %reason, "Retries exhausted");
                        record.error = Some(reason);
                        break None;
                    }
                    let delay = policy.backoff_delay(attempts - 1);
                    tracing::warn!(
                        url = %url,
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Request failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Fatal(reason) => {
                    attempts += 1;
                    tracing::warn!(url = %url, reason = %reason, "Request failed");
                    record.error = Some(reason);
                    break None;
                }
            }
        };

        if let Some(resp) = response {
            let status = resp.status().as_u16();
            let text = match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(url = %url, error = %self.redactor.redact(&e.to_string()), "Failed to read response body");
                    String::new()
                }
            };
            record.status_code = Some(status);
            record.data = parse_body(&text, self.options.response_text_limit);
            if !(200..400).contains(&status) {
                record.error = Some(FailureReason::Http(status));
            }
        }

        record.attempts = attempts;
        record.rate_limit_waits = waits;
        record.elapsed_ms = started.elapsed().as_millis() as u64;

        let success = record.error.is_none();
        tracing::debug!(url = %url, status = ?record.status_code, success, "Request complete");

        Ok(Outcome { success, record })
    }

    /// Probe `{base}/health`; anything below 500 counts as connected
    pub async fn health(&self) -> ApiStatus {
        let Ok(url) = build_url(&self.config.base_url, "health") else {
            return ApiStatus::Error;
        };
        let result = self
            .http
            .get(&url)
            .header("X-API-Key", &self.config.credentials.api_key)
            .header("X-ISS", &self.config.credentials.issuer)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().as_u16() < 500 => ApiStatus::Connected,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Upstream health check failed");
                ApiStatus::Error
            }
            Err(e) => {
                tracing::warn!(error = %self.redactor.redact(&e.to_string()), "Upstream unreachable");
                ApiStatus::Disconnected
            }
        }
    }

    fn classify(&self, result: std::result::Result<reqwest::Response, reqwest::Error>) -> Attempt {
        match result {
            Ok(resp) => Attempt::Response(resp),
            Err(e) if e.is_timeout() => Attempt::Retryable(FailureReason::Timeout),
            Err(e) if e.is_connect() || e.is_request() => Attempt::Retryable(
                FailureReason::Connection(self.redactor.redact(&e.to_string())),
            ),
            Err(e) => Attempt::Fatal(FailureReason::Connection(
                self.redactor.redact(&e.to_string()),
            )),
        }
    }

    fn outbound_headers(
        &self,
        request: &ExecuteRequest,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Vec<(&'static str, String)>> {
        let creds = &self.config.credentials;
        let mut headers = vec![
            ("X-API-Key", creds.api_key.clone()),
            ("X-ISS", creds.issuer.clone()),
            ("Content-Type", "application/json".to_string()),
            ("Accept", "application/json".to_string()),
        ];

        if request.use_jwt {
            let token = auth::generate_jwt(creds, Utc::now())?;
            headers.push(("Authorization", format!("Bearer {}", token)));
        } else {
            headers.push(("X-Secret-Key", creds.secret_key.clone()));
        }

        if request.use_hmac {
            let path = Url::parse(url)
                .map_err(|_| Error::InvalidEndpoint(request.endpoint.clone()))?
                .path()
                .to_string();
            let body = body.map(Value::to_string).unwrap_or_default();
            let signature = auth::hmac_signature(
                &creds.secret_key,
                request.method.as_str(),
                &path,
                &body,
                Utc::now().timestamp(),
            )?;
            headers.push(("X-Signature", signature));
        }

        Ok(headers)
    }
}
