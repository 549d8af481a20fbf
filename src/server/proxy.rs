//! Browser-facing proxy to the Feature.fm API
//!
//! Requests are validated before anything leaves the process. Credentials
//! are injected here and never accepted from the caller.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::AppState;
use crate::client::{build_url, HttpMethod};
use crate::common::redact::{truncate_text, Redactor};
use crate::common::{Config, Error, Result};

/// Longest accepted `X-Access-Id`
pub const MAX_ACCESS_ID_LEN: usize = 128;
/// Longest accepted `Authorization` value
pub const MAX_AUTHORIZATION_LEN: usize = 4096;

lazy_static! {
    static ref SAFE_PATH: Regex = Regex::new(r"^[A-Za-z0-9_\-./]+$").unwrap();
}

/// Body of a proxied response
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: ProxyBody,
}

impl ProxyResponse {
    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ProxyBody::Json(json!({ "error": message.into() })),
        }
    }

    fn error_with_code(status: StatusCode, message: impl Into<String>, code: &str) -> Self {
        Self {
            status,
            body: ProxyBody::Json(json!({ "error": message.into(), "code": code })),
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        match self.body {
            ProxyBody::Json(value) => (self.status, Json(value)).into_response(),
            ProxyBody::Text(text) => (
                self.status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response(),
        }
    }
}

/// Reject anything outside the safe character set or that could escape the base
pub fn validate_path(path: &str) -> Result<()> {
    if !SAFE_PATH.is_match(path) || path.contains("..") || path.contains("//") {
        return Err(Error::InvalidEndpoint(path.escape_debug().to_string()));
    }
    Ok(())
}

/// Caller headers that are passed through, after length checks
fn passthrough_headers(inbound: &HeaderMap) -> Result<Vec<(&'static str, String)>> {
    let mut out = Vec::new();

    if let Some(value) = inbound.get("x-access-id") {
        let value = value
            .to_str()
            .map_err(|_| Error::Validation("X-Access-Id must be ASCII".into()))?;
        if value.len() > MAX_ACCESS_ID_LEN {
            return Err(Error::Validation(format!(
                "X-Access-Id exceeds {} characters",
                MAX_ACCESS_ID_LEN
            )));
        }
        out.push(("X-Access-Id", value.to_string()));
    }

    if let Some(value) = inbound.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| Error::Validation("Authorization must be ASCII".into()))?;
        if !value.starts_with("Bearer ") {
            return Err(Error::Validation(
                "Authorization must be a Bearer token".into(),
            ));
        }
        if value.len() > MAX_AUTHORIZATION_LEN {
            return Err(Error::Validation(format!(
                "Authorization exceeds {} characters",
                MAX_AUTHORIZATION_LEN
            )));
        }
        out.push(("Authorization", value.to_string()));
    }

    Ok(out)
}

/// Forwards validated requests upstream with injected credentials
pub struct ProxyClient {
    http: reqwest::Client,
    config: Config,
    redactor: Redactor,
    text_limit: usize,
}

impl ProxyClient {
    pub fn new(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.settings.server.upstream_timeout_secs);
        Self::with_timeout(config, timeout)
    }

    pub fn with_timeout(config: Config, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.settings.http.user_agent.clone())
            .build()?;
        Ok(Self {
            redactor: Redactor::new(&config.credentials),
            text_limit: config.settings.output.proxy_text_limit,
            http,
            config,
        })
    }

    /// Forward one request; every failure maps to a status code
    pub async fn forward(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &[u8],
        inbound: &HeaderMap,
    ) -> ProxyResponse {
        match self.try_forward(method, path, query, body, inbound).await {
            Ok(response) => response,
            Err(e) => {
                let message = self.redactor.redact(&e.to_string());
                let status = match e {
                    Error::InvalidEndpoint(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
                    Error::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                    Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                if status.is_client_error() {
                    tracing::warn!(method, path, error = %message, "Rejected proxy request");
                } else {
                    tracing::error!(method, path, error = %message, "Proxy request failed");
                }
                let message = match status {
                    StatusCode::GATEWAY_TIMEOUT => "Request timeout".to_string(),
                    _ => message,
                };
                ProxyResponse::error_with_code(status, message, e.kind())
            }
        }
    }

    async fn try_forward(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &[u8],
        inbound: &HeaderMap,
    ) -> Result<ProxyResponse> {
        let method: HttpMethod = method.parse()?;
        validate_path(path)?;
        if method.is_write() {
            self.config
                .require_write_permission(&format!("{} {}", method, path))?;
        }
        let mut url = build_url(&self.config.base_url, path)?;
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }

        let json_body = if method.has_body() && !body.is_empty() {
            let value: Value = serde_json::from_slice(body)
                .map_err(|_| Error::Validation("Request body must be valid JSON".into()))?;
            Some(value)
        } else {
            None
        };

        let creds = &self.config.credentials;
        let mut builder = self
            .http
            .request(method.to_reqwest_method(), &url)
            .header("Content-Type", "application/json")
            .header("X-API-Key", &creds.api_key)
            .header("X-ISS", &creds.issuer)
            .header("X-Secret-Key", &creds.secret_key);
        for (name, value) in passthrough_headers(inbound)? {
            builder = builder.header(name, value);
        }
        if let Some(value) = &json_body {
            builder = builder.json(value);
        }

        tracing::debug!(method = %method, url = %url, "Proxying request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    url: url.clone(),
                    attempts: 1,
                }
            } else {
                Error::connection(&url, &e.to_string())
            }
        })?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| Error::Internal(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| Error::connection(&url, &e.to_string()))?;

        tracing::debug!(status = status.as_u16(), "Upstream responded");

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(value) => ProxyBody::Json(value),
            Err(_) => ProxyBody::Text(truncate_text(&text, self.text_limit)),
        };
        Ok(ProxyResponse { status, body })
    }
}

/// `ANY /api/proxy/*endpoint`
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method.as_str().parse::<HttpMethod>().is_err() {
        let mut response = ProxyResponse::error(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} is not allowed", method),
        )
        .into_response();
        response.headers_mut().insert(
            header::ALLOW,
            HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE"),
        );
        return response;
    }

    state
        .proxy
        .forward(method.as_str(), &endpoint, query.as_deref(), &body, &headers)
        .await
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("artists").is_ok());
        assert!(validate_path("smartlink/abc-123/analytics").is_ok());
        assert!(validate_path("v2/promoted_songs.json").is_ok());

        assert!(validate_path("../secret").is_err());
        assert!(validate_path("a//b").is_err());
        assert!(validate_path("a b").is_err());
        assert!(validate_path("a?b=1").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn test_passthrough_headers_caps() {
        let mut headers = HeaderMap::new();
        headers.insert("x-access-id", HeaderValue::from_static("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t0k3n"));
        let out = passthrough_headers(&headers).unwrap();
        assert_eq!(out.len(), 2);

        let mut long = HeaderMap::new();
        long.insert(
            "x-access-id",
            HeaderValue::from_str(&"a".repeat(MAX_ACCESS_ID_LEN + 1)).unwrap(),
        );
        assert!(passthrough_headers(&long).is_err());

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert!(passthrough_headers(&basic).is_err());
    }
}
