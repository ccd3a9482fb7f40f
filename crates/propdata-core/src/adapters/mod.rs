//! Vendor clients.
//!
//! Real clients authenticate with client credentials, pass every call through
//! the vendor's rate gate and a per-request deadline, and retry once with a
//! fresh token after a 401. Mock clients do no I/O and derive their data from
//! the rolling hash of the input.

mod corelogic;
mod mock;
mod reinz;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::{ClientCredentials, TokenManager};
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::SourceError;
use crate::http_client::{execute_with_deadline, HttpClient, HttpRequest, HttpResponse};
use crate::vendor_policy::{RateGate, VendorPolicy};

pub use corelogic::CoreLogicClient;
pub use mock::{MockLatency, MockMarketClient, MockPropertyClient};
pub use reinz::ReinzClient;

/// Connection settings for a real vendor.
#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub base_url: String,
    pub credentials: ClientCredentials,
    pub policy: VendorPolicy,
}

impl VendorConfig {
    pub fn new(
        base_url: impl Into<String>,
        credentials: ClientCredentials,
        policy: VendorPolicy,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            credentials,
            policy,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }
}

/// Authenticated, rate-limited JSON GETs against one vendor.
struct VendorTransport {
    vendor: &'static str,
    base_url: String,
    http_client: Arc<dyn HttpClient>,
    tokens: TokenManager,
    gate: RateGate,
    timeout_ms: u64,
}

impl VendorTransport {
    fn new(
        config: VendorConfig,
        http_client: Arc<dyn HttpClient>,
        auth_breaker: Option<Arc<CircuitBreaker>>,
    ) -> Self {
        let timeout_ms = config.policy.request_timeout_ms();
        let mut tokens = TokenManager::new(
            config.policy.vendor,
            config.token_url(),
            config.credentials,
            Arc::clone(&http_client),
        )
        .with_timeout_ms(timeout_ms);
        if let Some(breaker) = auth_breaker {
            tokens = tokens.with_breaker(breaker);
        }

        Self {
            vendor: config.policy.vendor,
            base_url: config.base_url,
            http_client,
            tokens,
            gate: RateGate::from_policy(&config.policy),
            timeout_ms,
        }
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        self.gate.acquire().await?;

        let mut response = self.send(path, query).await?;
        if response.status == 401 {
            tracing::info!(vendor = self.vendor, path, "vendor rejected token, re-authenticating");
            self.tokens.invalidate().await;
            response = self.send(path, query).await?;
        }

        match response.status {
            status if (200..300).contains(&status) => {}
            401 | 403 => {
                return Err(SourceError::authentication(format!(
                    "{} rejected credentials with status {}",
                    self.vendor, response.status
                )))
            }
            404 => {
                return Err(SourceError::not_found(format!(
                    "{} has no data for {path}",
                    self.vendor
                )))
            }
            429 => {
                return Err(SourceError::rate_limited(format!(
                    "{} returned status 429",
                    self.vendor
                )))
            }
            status => {
                return Err(SourceError::upstream(
                    status,
                    format!("{} upstream returned status {status}", self.vendor),
                ))
            }
        }

        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::malformed(format!("failed to parse {} response: {error}", self.vendor))
        })
    }

    async fn send(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<HttpResponse, SourceError> {
        let auth = self.tokens.bearer().await?;
        let request = HttpRequest::get(format!("{}{path}", self.base_url))
            .with_query(query.iter().cloned())
            .with_auth(&auth)
            .with_header("accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

        execute_with_deadline(self.http_client.as_ref(), request)
            .await
            .map_err(|error| SourceError::from_http(self.vendor, &error))
    }
}

fn encode_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
