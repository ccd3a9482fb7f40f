//! Gateway orchestration shared by the market and property gateways.
//!
//! A gateway validates the request, serves a fresh cache entry when it can,
//! picks the mock or real vendor once per invocation, runs every facet through
//! the circuit breakers, normalizes what came back and writes the envelope to
//! the cache. Facets the caller required fail the whole request; the rest
//! degrade to a [`FacetNotice`].

mod market;
mod property;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::adapters::{CoreLogicClient, MockMarketClient, MockPropertyClient, ReinzClient};
use crate::breaker_registry::CircuitBreakerRegistry;
use crate::cache::ResponseCache;
use crate::config::GatewaySettings;
use crate::data_source::{MarketDataSource, PropertyDataSource, SourceError};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalize::NormalizationError;
use crate::rollout::{resolve_flag, select_provider, RolloutFlagSource, StaticFlagSource};
use crate::{FacetNotice, ProviderKind};

pub use market::MarketDataGateway;
pub use property::PropertyDataGateway;

/// Error text for a facet whose breaker refused the call.
pub const SERVICE_UNAVAILABLE: &str = "service temporarily unavailable";

/// Why a single facet produced no data.
#[derive(Debug, Error)]
pub enum FacetError {
    #[error("{}", SERVICE_UNAVAILABLE)]
    CircuitOpen { circuit: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

/// Runs `call` behind the `circuit` breaker and the global breaker.
///
/// The call is attempted only when both admit it. Outcomes are recorded on
/// both; errors that say nothing about vendor health are recorded on neither.
/// Dropping the returned future before completion records nothing.
pub async fn guarded_call<T, F>(
    registry: &CircuitBreakerRegistry,
    circuit: &str,
    call: F,
) -> Result<T, FacetError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    let endpoint = registry.breaker(circuit);
    let Some(endpoint_permit) = endpoint.try_acquire() else {
        tracing::warn!(circuit, state = %endpoint.state(), "circuit refused call");
        return Err(FacetError::CircuitOpen {
            circuit: circuit.to_owned(),
        });
    };

    let global = registry.global();
    let Some(global_permit) = global.try_acquire() else {
        endpoint_permit.neutral();
        tracing::warn!(circuit = global.name(), state = %global.state(), "circuit refused call");
        return Err(FacetError::CircuitOpen {
            circuit: global.name().to_owned(),
        });
    };

    match call.await {
        Ok(value) => {
            endpoint_permit.success();
            global_permit.success();
            Ok(value)
        }
        Err(error) if error.counts_as_failure() => {
            tracing::warn!(circuit, %error, "vendor call failed");
            endpoint_permit.failure();
            global_permit.failure();
            Err(FacetError::Source(error))
        }
        Err(error) => {
            tracing::debug!(
                circuit,
                %error,
                token_exchange = error.is_token_exchange(),
                "vendor call rejected without a breaker failure"
            );
            endpoint_permit.neutral();
            global_permit.neutral();
            Err(FacetError::Source(error))
        }
    }
}

/// Collects facet outcomes into notices and, for required facets, a failure.
#[derive(Debug, Default)]
struct FacetCollector {
    unavailable: Vec<FacetNotice>,
    failure: Option<String>,
}

impl FacetCollector {
    fn take<T>(&mut self, facet: &str, required: bool, result: Result<T, FacetError>) -> Option<T> {
        let error = match result {
            Ok(value) => return Some(value),
            Err(error) => error,
        };

        tracing::warn!(facet, required, %error, "facet unavailable");
        if required {
            if self.failure.is_none() {
                self.failure = Some(format!("{facet} unavailable: {error}"));
            }
        } else {
            self.unavailable.push(FacetNotice {
                facet: facet.to_owned(),
                reason: error.to_string(),
            });
        }
        None
    }

    fn into_failure(self) -> Result<Vec<FacetNotice>, String> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.unavailable),
        }
    }
}

/// State shared by both gateways.
#[derive(Clone)]
struct GatewayContext {
    registry: Arc<CircuitBreakerRegistry>,
    cache: ResponseCache,
    flags: Arc<dyn RolloutFlagSource>,
    force_mock: bool,
}

impl GatewayContext {
    async fn provider_for(
        &self,
        flag_id: &str,
        rollout_key: &str,
        real_available: bool,
    ) -> ProviderKind {
        let flag = resolve_flag(self.flags.as_ref(), flag_id).await;
        let selected = select_provider(rollout_key, flag, self.force_mock);
        if selected == ProviderKind::Real && !real_available {
            tracing::debug!(flag = flag_id, "real vendor not configured, using mock");
            return ProviderKind::Mock;
        }
        selected
    }

    /// Mock facets skip the breakers; they never fail on vendor health.
    async fn run_facet<T, F>(
        &self,
        provider: ProviderKind,
        circuit: &str,
        call: F,
    ) -> Result<T, FacetError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        match provider {
            ProviderKind::Real => guarded_call(&self.registry, circuit, call).await,
            ProviderKind::Mock => call.await.map_err(FacetError::Source),
        }
    }
}

/// Market and property gateways sharing one registry, cache and flag source.
pub struct Gateways {
    pub market: MarketDataGateway,
    pub property: PropertyDataGateway,
    registry: Arc<CircuitBreakerRegistry>,
    cache: ResponseCache,
}

impl Gateways {
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}

/// Wires gateways from [`GatewaySettings`].
///
/// Real vendor clients are created only for vendors with credentials; any
/// source can be replaced, which is how tests inject fakes.
pub struct GatewayBuilder {
    settings: GatewaySettings,
    registry: Option<Arc<CircuitBreakerRegistry>>,
    cache: Option<ResponseCache>,
    flags: Option<Arc<dyn RolloutFlagSource>>,
    http_client: Option<Arc<dyn HttpClient>>,
    real_property: Option<Arc<dyn PropertyDataSource>>,
    real_market: Option<Arc<dyn MarketDataSource>>,
}

impl GatewayBuilder {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            settings,
            registry: None,
            cache: None,
            flags: None,
            http_client: None,
            real_property: None,
            real_market: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_flag_source(mut self, flags: Arc<dyn RolloutFlagSource>) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Transport for the real vendor clients built from settings.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_real_property_source(mut self, source: Arc<dyn PropertyDataSource>) -> Self {
        self.real_property = Some(source);
        self
    }

    pub fn with_real_market_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.real_market = Some(source);
        self
    }

    pub fn build(self) -> Gateways {
        let settings = self.settings;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CircuitBreakerRegistry::new(settings.breakers.clone())));
        let cache = self
            .cache
            .unwrap_or_else(|| ResponseCache::in_memory(settings.cache_ttl));
        let flags = self
            .flags
            .unwrap_or_else(|| Arc::new(StaticFlagSource::new()));

        let needs_transport = (self.real_property.is_none() && settings.corelogic.is_some())
            || (self.real_market.is_none() && settings.reinz.is_some());
        let http_client: Option<Arc<dyn HttpClient>> = match self.http_client {
            Some(client) => Some(client),
            None if needs_transport => Some(Arc::new(ReqwestHttpClient::new())),
            None => None,
        };

        let real_property = self.real_property.or_else(|| {
            let config = settings.corelogic.clone()?;
            let http_client = http_client.clone()?;
            let client: Arc<dyn PropertyDataSource> = Arc::new(CoreLogicClient::with_auth_breaker(
                config,
                http_client,
                registry.authentication(),
            ));
            Some(client)
        });
        let real_market = self.real_market.or_else(|| {
            let config = settings.reinz.clone()?;
            let http_client = http_client.clone()?;
            let client: Arc<dyn MarketDataSource> = Arc::new(ReinzClient::with_auth_breaker(
                config,
                http_client,
                registry.authentication(),
            ));
            Some(client)
        });

        let mock_property: Arc<dyn PropertyDataSource> =
            Arc::new(MockPropertyClient::new(settings.mock_latency));
        let mock_market: Arc<dyn MarketDataSource> =
            Arc::new(MockMarketClient::new(settings.mock_latency));

        let context = GatewayContext {
            registry: Arc::clone(&registry),
            cache: cache.clone(),
            flags,
            force_mock: settings.force_mock,
        };

        tracing::debug!(
            force_mock = settings.force_mock,
            real_property = real_property.is_some(),
            real_market = real_market.is_some(),
            "gateways ready"
        );

        Gateways {
            market: MarketDataGateway::new(context.clone(), mock_market, real_market),
            property: PropertyDataGateway::new(context, mock_property, real_property),
            registry,
            cache,
        }
    }
}
