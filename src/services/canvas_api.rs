use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::core::config::{ApiCredentials, Settings};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECONDS: u64 = 3600;
const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiMethod {
    Get,
    Post,
    Delete,
}

impl ApiMethod {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }

    fn as_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Delete => Method::DELETE,
        }
    }
}

/// Form or query pairs, e.g. `("assignment[name]", "...")`.
pub(crate) type Payload = [(&'static str, String)];

#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub(crate) status: StatusCode,
    pub(crate) body: Value,
}

impl ApiResponse {
    pub(crate) fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct CanvasApiClient {
    client: Client,
    base_url: String,
    canvas_prefix: String,
    scope: String,
    credentials: ApiCredentials,
    token_path: String,
    max_attempts: u32,
    retry_base_delay: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl CanvasApiClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let api = settings.api();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()
            .context("Failed to build Canvas HTTP client")?;

        Ok(Self {
            client,
            base_url: api.base_url.clone(),
            canvas_prefix: api.canvas_prefix.clone(),
            scope: api.scope.clone(),
            credentials: api.credentials.clone(),
            token_path: api.token_path.clone(),
            max_attempts: api.max_attempts.max(1),
            retry_base_delay: Duration::from_millis(api.retry_base_delay_ms),
            token: Mutex::new(None),
        })
    }

    pub(crate) async fn call(
        &self,
        endpoint: &str,
        method: ApiMethod,
        payload: &Payload,
    ) -> Option<ApiResponse> {
        let url = self.endpoint_url(endpoint);

        for attempt in 1..=self.max_attempts {
            match self.attempt(&url, method, payload).await {
                Ok(response) => {
                    metrics::counter!("canvas_api_attempts_total", "outcome" => "usable")
                        .increment(1);
                    tracing::debug!(
                        endpoint,
                        method = method.as_str(),
                        status = response.status.as_u16(),
                        attempt,
                        "Canvas API call completed"
                    );
                    return Some(response);
                }
                Err(err) => {
                    metrics::counter!("canvas_api_attempts_total", "outcome" => "failed")
                        .increment(1);
                    tracing::warn!(
                        endpoint,
                        method = method.as_str(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Canvas API attempt failed"
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        metrics::counter!("canvas_api_exhausted_total").increment(1);
        tracing::warn!(
            endpoint,
            method = method.as_str(),
            max_attempts = self.max_attempts,
            "Canvas API retries exhausted"
        );
        None
    }

    async fn attempt(
        &self,
        url: &str,
        method: ApiMethod,
        payload: &Payload,
    ) -> Result<ApiResponse> {
        let token = self.access_token().await?;

        let mut request = self.client.request(method.as_reqwest(), url).bearer_auth(token);
        if let Some(client_id) = self.credentials.client_id() {
            request = request.header("X-IBM-Client-Id", client_id);
        }
        if !payload.is_empty() {
            request = match method {
                ApiMethod::Get => request.query(payload),
                ApiMethod::Post | ApiMethod::Delete => request.form(payload),
            };
        }

        let response = request.send().await.context("Failed to call Canvas API")?;
        let status = response.status();
        let raw_body = response.text().await.context("Failed to read Canvas API response")?;

        let body = parse_usable_body(&raw_body).ok_or_else(|| {
            anyhow!(
                "Canvas API returned non-JSON body (status {}): {}",
                status,
                preview(&raw_body)
            )
        })?;

        Ok(ApiResponse { status, body })
    }

    async fn access_token(&self) -> Result<String> {
        let (client_id, client_secret) = match &self.credentials {
            ApiCredentials::StaticToken { token, .. } => return Ok(token.clone()),
            ApiCredentials::ClientCredentials { client_id, client_secret } => {
                (client_id, client_secret)
            }
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/{}", self.base_url, self.token_path);
        let response = self
            .client
            .post(&url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", self.scope.as_str())])
            .send()
            .await
            .context("Failed to call token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Token endpoint returned status {status}");
        }

        let token: TokenResponse =
            response.json().await.context("Token endpoint returned malformed body")?;
        let expires_in = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS);
        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);

        tracing::debug!(expires_in_seconds = lifetime.as_secs(), "Obtained API access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.canvas_prefix, endpoint.trim_start_matches('/'))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay.saturating_mul(factor)
    }
}

// Status is ignored: a JSON error object from a 4xx is still usable.
pub(crate) fn parse_usable_body(raw_body: &str) -> Option<Value> {
    serde_json::from_str(raw_body).ok()
}

fn preview(raw_body: &str) -> String {
    raw_body.chars().take(BODY_PREVIEW_CHARS).collect()
}
