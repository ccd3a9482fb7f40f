//! OAuth2 client-credentials tokens for vendor APIs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::SourceError;
use crate::http_client::{execute_with_deadline, HttpAuth, HttpClient, HttpRequest};

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;
const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Caches a bearer token and refreshes it shortly before expiry.
///
/// The cache lock is held across the exchange, so concurrent callers that find
/// the token stale wait for a single refresh instead of starting their own.
pub struct TokenManager {
    vendor: &'static str,
    token_url: String,
    credentials: ClientCredentials,
    http_client: Arc<dyn HttpClient>,
    refresh_margin: Duration,
    timeout_ms: u64,
    breaker: Option<Arc<CircuitBreaker>>,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("vendor", &self.vendor)
            .field("token_url", &self.token_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl TokenManager {
    pub fn new(
        vendor: &'static str,
        token_url: impl Into<String>,
        credentials: ClientCredentials,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            vendor,
            token_url: token_url.into(),
            credentials,
            http_client,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            timeout_ms: crate::http_client::DEFAULT_TIMEOUT_MS,
            breaker: None,
            cached: Mutex::new(None),
        }
    }

    /// Guards token exchanges with the given circuit.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Current bearer auth, exchanging credentials when the cached token is stale.
    pub async fn bearer(&self) -> Result<HttpAuth, SourceError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(HttpAuth::BearerToken(token.access_token.clone()));
            }
        }

        let token = self.exchange().await?;
        let auth = HttpAuth::BearerToken(token.access_token.clone());
        *cached = Some(token);
        Ok(auth)
    }

    /// Drops the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        tracing::debug!(vendor = self.vendor, "invalidating cached token");
        *self.cached.lock().await = None;
    }

    pub async fn has_cached_token(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    async fn exchange(&self) -> Result<CachedToken, SourceError> {
        let permit = match &self.breaker {
            Some(breaker) => match breaker.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    return Err(SourceError::circuit_open(breaker.name()).from_token_exchange())
                }
            },
            None => None,
        };

        let result = self.request_token().await;
        if let Some(permit) = permit {
            match &result {
                Ok(_) => permit.success(),
                Err(error) if error.counts_as_failure() => permit.failure(),
                Err(_) => permit.neutral(),
            }
        }
        result.map_err(SourceError::from_token_exchange)
    }

    async fn request_token(&self) -> Result<CachedToken, SourceError> {
        tracing::debug!(vendor = self.vendor, "requesting access token");

        let request = HttpRequest::post(&self.token_url)
            .with_auth(&HttpAuth::Basic {
                username: self.credentials.client_id.clone(),
                password: self.credentials.client_secret.clone(),
            })
            .with_header("accept", "application/json")
            .with_form([("grant_type", "client_credentials")])
            .with_timeout_ms(self.timeout_ms);

        let response = execute_with_deadline(self.http_client.as_ref(), request)
            .await
            .map_err(|error| SourceError::from_http(self.vendor, &error))?;

        if !response.is_success() {
            return Err(SourceError::authentication(format!(
                "{} token endpoint returned status {}",
                self.vendor, response.status
            )));
        }

        let payload: TokenResponse = serde_json::from_str(&response.body).map_err(|error| {
            SourceError::malformed(format!("{} token response: {error}", self.vendor))
        })?;
        let access_token = payload
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SourceError::malformed(format!(
                    "{} token response had no access_token",
                    self.vendor
                ))
            })?;

        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        Ok(CachedToken {
            access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(self.refresh_margin),
        })
    }
}
