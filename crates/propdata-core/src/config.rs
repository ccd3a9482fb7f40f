//! Gateway configuration from `PROPDATA_*` environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PROPDATA_CORELOGIC_BASE_URL` | `https://api.corelogic.co.nz` |
//! | `PROPDATA_CORELOGIC_CLIENT_ID` / `_CLIENT_SECRET` | unset (mock only) |
//! | `PROPDATA_REINZ_BASE_URL` | `https://api.reinz.co.nz` |
//! | `PROPDATA_REINZ_CLIENT_ID` / `_CLIENT_SECRET` | unset (mock only) |
//! | `PROPDATA_FORCE_MOCK` | `false` |
//! | `PROPDATA_CACHE_TTL_SECS` | `86400` |
//! | `PROPDATA_HTTP_TIMEOUT_MS` | `10000` |
//! | `PROPDATA_BREAKER_FAILURE_THRESHOLD` | `5` |
//! | `PROPDATA_BREAKER_RESET_TIMEOUT_MS` | `60000` |
//! | `PROPDATA_BREAKER_HALF_OPEN_MAX` | `3` |
//! | `PROPDATA_MOCK_LATENCY_MS` | `150` |
//!
//! A vendor without both credentials is never called for real.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::adapters::{MockLatency, VendorConfig};
use crate::auth::ClientCredentials;
use crate::breaker_registry::BreakerSettings;
use crate::cache::DEFAULT_CACHE_TTL;
use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::vendor_policy::VendorPolicy;
use crate::ValidationError;

pub const ENV_PREFIX: &str = "PROPDATA_";
pub const DEFAULT_CORELOGIC_BASE_URL: &str = "https://api.corelogic.co.nz";
pub const DEFAULT_REINZ_BASE_URL: &str = "https://api.reinz.co.nz";

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub corelogic: Option<VendorConfig>,
    pub reinz: Option<VendorConfig>,
    pub force_mock: bool,
    pub cache_ttl: Duration,
    pub http_timeout: Duration,
    pub breakers: BreakerSettings,
    pub mock_latency: MockLatency,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            corelogic: None,
            reinz: None,
            force_mock: false,
            cache_ttl: DEFAULT_CACHE_TTL,
            http_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            breakers: BreakerSettings::default(),
            mock_latency: MockLatency::realistic(),
        }
    }
}

impl GatewaySettings {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup`, which receives full variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut settings = Self::default();

        if let Some(value) = read("FORCE_MOCK") {
            settings.force_mock = parse_bool("PROPDATA_FORCE_MOCK", &value)?;
        }
        if let Some(value) = read("CACHE_TTL_SECS") {
            settings.cache_ttl =
                Duration::from_secs(parse_number("PROPDATA_CACHE_TTL_SECS", &value)?);
        }
        if let Some(value) = read("HTTP_TIMEOUT_MS") {
            let timeout_ms: u64 = parse_number("PROPDATA_HTTP_TIMEOUT_MS", &value)?;
            if timeout_ms == 0 {
                return Err(invalid("PROPDATA_HTTP_TIMEOUT_MS", &value));
            }
            settings.http_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(value) = read("MOCK_LATENCY_MS") {
            let base = Duration::from_millis(parse_number("PROPDATA_MOCK_LATENCY_MS", &value)?);
            settings.mock_latency = MockLatency {
                base,
                jitter: base / 2,
            };
        }

        let endpoint = &mut settings.breakers.endpoint;
        if let Some(value) = read("BREAKER_FAILURE_THRESHOLD") {
            endpoint.failure_threshold =
                parse_number("PROPDATA_BREAKER_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = read("BREAKER_RESET_TIMEOUT_MS") {
            endpoint.reset_timeout =
                Duration::from_millis(parse_number("PROPDATA_BREAKER_RESET_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = read("BREAKER_HALF_OPEN_MAX") {
            endpoint.half_open_max_requests =
                parse_number("PROPDATA_BREAKER_HALF_OPEN_MAX", &value)?;
        }
        settings.breakers.endpoint.validate()?;

        settings.corelogic = vendor_config(
            read("CORELOGIC_BASE_URL").unwrap_or_else(|| String::from(DEFAULT_CORELOGIC_BASE_URL)),
            read("CORELOGIC_CLIENT_ID"),
            read("CORELOGIC_CLIENT_SECRET"),
            VendorPolicy::corelogic_default().with_request_timeout(settings.http_timeout),
        );
        settings.reinz = vendor_config(
            read("REINZ_BASE_URL").unwrap_or_else(|| String::from(DEFAULT_REINZ_BASE_URL)),
            read("REINZ_CLIENT_ID"),
            read("REINZ_CLIENT_SECRET"),
            VendorPolicy::reinz_default().with_request_timeout(settings.http_timeout),
        );

        Ok(settings)
    }

    pub fn with_force_mock(mut self, force_mock: bool) -> Self {
        self.force_mock = force_mock;
        self
    }

    pub fn with_mock_latency(mut self, latency: MockLatency) -> Self {
        self.mock_latency = latency;
        self
    }
}

fn vendor_config(
    base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    policy: VendorPolicy,
) -> Option<VendorConfig> {
    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Some(VendorConfig::new(
            base_url,
            ClientCredentials::new(client_id, client_secret),
            policy,
        )),
        _ => {
            tracing::debug!(vendor = policy.vendor, "vendor credentials not configured, mock only");
            None
        }
    }
}

fn invalid(name: &str, value: &str) -> ValidationError {
    ValidationError::InvalidSetting {
        name: name.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ValidationError> {
    value.parse().map_err(|_| invalid(name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}
