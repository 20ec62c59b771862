use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use crate::chain::SignedDataVerifier;
use crate::config::MerchantConfig;
use crate::error::IapError;
use crate::notify::resolve_nested;
use crate::provider::ProviderProfile;
use crate::signer::{RequestContext, TokenSigner};

const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Status and decoded body of a server API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON, a JSON string for non-JSON bodies, or `null` when empty.
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client that signs every server API call with a fresh bearer token.
///
/// Redirects are never followed. Statuses listed in the merchant's
/// `retry_on_status`, and transport errors, are retried with linear backoff
/// until `max_retry_attempts` attempts have been made.
pub struct ServerApiClient {
    http: reqwest::Client,
    signer: TokenSigner,
    base_url: String,
    max_attempts: u32,
    config: MerchantConfig,
    backoff: Duration,
}

impl ServerApiClient {
    pub fn new(
        signer: TokenSigner,
        base_url: impl Into<String>,
        config: &MerchantConfig,
    ) -> Result<Self, IapError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IapError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            signer,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: config.max_retry_attempts.max(1),
            config: config.clone(),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Client for `profile` in the merchant's configured environment.
    pub fn for_provider(profile: &ProviderProfile, config: &MerchantConfig) -> Result<Self, IapError> {
        let signer = profile.signer(config)?;
        Self::new(signer, profile.base_url(config.environment), config)
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a signed request for `path` without sending it.
    pub fn authorized_request(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Request, IapError> {
        let ctx = RequestContext::new(method.as_str(), path, body);
        let authorization = self.signer.authorization_value(&ctx)?;

        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/json")
            .body(ctx.body)
            .build()
            .map_err(|e| IapError::Http(format!("invalid request: {e}")))
    }

    /// Send a signed request, retrying per the merchant policy.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, IapError> {
        let body = match body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            // Fresh token per attempt; signing errors surface before any I/O.
            let request = self.authorized_request(method.clone(), path, body.clone())?;

            match self.http.execute(request).await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if self.config.should_retry(status) && attempt < self.max_attempts {
                        tracing::warn!(status, attempt, path = %path, "retrying server API call");
                        tokio::time::sleep(self.backoff * attempt).await;
                        continue;
                    }
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| IapError::Http(format!("failed to read response: {e}")))?;
                    return Ok(ApiResponse {
                        status,
                        body: parse_body(&bytes),
                    });
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(attempt, path = %path, error = %e, "server API call failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    return Err(IapError::Http(format!("request failed: {e}")));
                }
            }
        }
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Replace signed string fields of an API response with their verified payloads.
///
/// `paths` are dotted JSON paths, walked through arrays as in [`resolve_nested`],
/// so `signedTransactions` decodes every element of a token array. Absent, `null`
/// and empty fields are left as-is.
pub fn decode_signed_fields(
    body: &mut Value,
    paths: &[String],
    verifier: &SignedDataVerifier,
) -> Result<(), IapError> {
    match body {
        Value::Object(map) => resolve_nested(map, paths, verifier),
        _ => Ok(()),
    }
}
