use crate::config::{ApiConfig, AuthMode};
use crate::error::{ClientError, Result};
use crate::metrics;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use resilience::RetryConfig;
use std::time::Instant;
use tracing::{debug, warn};

/// Authenticated JSON-over-HTTP client for the console backend
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    auth_mode: AuthMode,
    retry: RetryConfig,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        // Url::join drops the last segment unless the base ends with '/'
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| ClientError::InvalidUrl(format!("{base}: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            auth_mode: config.auth_mode,
            retry: config.retry.clone(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t| !t.trim().is_empty());
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Build an authenticated request
    ///
    /// Fails with `Unauthenticated` before anything touches the network when
    /// no token is held.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::Unauthenticated)?;
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))?;

        match self.auth_mode {
            AuthMode::Header => Ok(self.http.request(method, url).bearer_auth(token)),
            AuthMode::QueryParam => {
                url.query_pairs_mut().append_pair("token", token);
                Ok(self.http.request(method, url))
            }
        }
    }

    /// Send a request; non-2xx statuses become `ClientError::Http`
    pub async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
        let (http, request) = request.build_split();
        let request = request?;
        let method = request.method().clone();
        let started = Instant::now();

        let response = match http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                metrics::observe_rest_call(method.as_str(), operation, 0, started.elapsed());
                warn!(operation, method = %method, error = %e, "request failed before a response");
                return Err(e.into());
            }
        };

        let status = response.status();
        metrics::observe_rest_call(method.as_str(), operation, status.as_u16(), started.elapsed());

        if status.is_success() {
            debug!(operation, method = %method, status = status.as_u16(), "request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message_from_body(status, &body);
        warn!(
            operation,
            method = %method,
            status = status.as_u16(),
            message = %message,
            "request rejected"
        );
        Err(ClientError::Http { status, message })
    }

    /// Build and send in one step
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        operation: &'static str,
    ) -> Result<Response> {
        let request = self.request(method, path)?;
        self.send(operation, request).await
    }
}

/// Best-effort human message from an error response body
///
/// JSON bodies are searched for `message`, `error` and `detail`; otherwise
/// the trimmed text is used, and an empty body falls back to the status reason.
pub fn error_message_from_body(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed)
    {
        for key in ["message", "error", "detail"] {
            if let Some(text) = map.get(key).and_then(|v| v.as_str()) {
                if !text.trim().is_empty() {
                    return text.trim().to_string();
                }
            }
        }
    }

    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
