//! # Propdata Core
//!
//! Resilient gateway between a property-appraisal application and its
//! property and market data vendors.
//!
//! ## Overview
//!
//! For every request the gateway decides:
//!
//! - **which backend** serves it: the mock client or the real vendor, chosen
//!   deterministically per request key by a percentage rollout flag
//! - **whether to call it at all**: each vendor endpoint sits behind a circuit
//!   breaker, plus a global breaker shared by every endpoint
//! - **whether the cache already answers it**: successful envelopes are kept
//!   for a TTL and returned verbatim
//! - **what the caller sees**: vendor payloads are normalized into canonical
//!   models inside a `{success, error?, data?}` envelope
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | CoreLogic and REINZ clients, real and mock |
//! | [`auth`] | Client-credentials token exchange and caching |
//! | [`breaker_registry`] | Named breakers, settings, background monitor |
//! | [`cache`] | TTL response cache over memory or DuckDB |
//! | [`circuit_breaker`] | Three-state circuit breaker |
//! | [`config`] | `PROPDATA_*` environment configuration |
//! | [`data_source`] | Vendor traits, vendor records, `SourceError` |
//! | [`domain`] | Requests, queries and canonical models |
//! | [`envelope`] | Response envelope |
//! | [`error`] | Core error types |
//! | [`gateway`] | Market and property orchestration |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`normalize`] | Vendor records to canonical models |
//! | [`rollout`] | Rolling hash, rollout flags, provider selection |
//! | [`vendor_policy`] | Per-vendor quotas and timeouts |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use propdata_core::{CacheMode, GatewayBuilder, GatewaySettings, MarketDataRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateways = GatewayBuilder::new(GatewaySettings::from_env()?).build();
//!
//!     let request = MarketDataRequest::new("Ponsonby", "Auckland").with_property_type("house");
//!     let response = gateways.market.fetch(&request, CacheMode::Use).await;
//!
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Gateway        │────▶│ Response Cache   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Rollout select  │────▶│ Circuit Breakers │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Vendor client   │────▶│ HTTP Client      │
//! │ (mock or real)  │     │ (reqwest)        │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Normalizer      │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Gateways never return `Err`; every outcome is an envelope. Vendor errors
//! carry a kind that decides whether a breaker records them:
//!
//! ```rust
//! use propdata_core::{SourceError, SourceErrorKind};
//!
//! fn trips_breaker(error: &SourceError) -> bool {
//!     match error.kind() {
//!         SourceErrorKind::NotFound | SourceErrorKind::InvalidRequest => false,
//!         _ => error.counts_as_failure(),
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Vendor credentials are read from the environment only and never logged
//! - Bearer tokens live in memory and are dropped on a 401

pub mod adapters;
pub mod auth;
pub mod breaker_registry;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod normalize;
pub mod rollout;
pub mod vendor_policy;

// Vendor clients
pub use adapters::{
    CoreLogicClient, MockLatency, MockMarketClient, MockPropertyClient, ReinzClient, VendorConfig,
};

// Authentication
pub use auth::{ClientCredentials, TokenManager};

// Circuit breakers
pub use breaker_registry::{BreakerSettings, CircuitBreakerRegistry, MonitorHandle};
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitSnapshot, CircuitState,
    ListenerId, StateChange,
};

// Caching
pub use cache::{
    CacheBackend, CacheError, CacheMode, CachedEntry, MemoryCacheBackend, ResponseCache,
    StoreCacheBackend,
};

// Configuration
pub use config::GatewaySettings;

// Vendor contracts
pub use data_source::{MarketDataSource, PropertyDataSource, SourceError, SourceErrorKind};

// Domain models
pub use domain::{
    AddressMatch, FacetNotice, MarketDataRequest, MarketFacet, MarketQuery, MarketReport,
    MarketSnapshot, MarketStatistics, MarketTemperature, MonthlyMarketPoint, NeighbourMedian,
    PropertyAttributes, PropertyDataRequest, PropertyFacet, PropertyQuery, PropertyReport,
    ProviderKind, SaleRecord, SalesHistory, SuburbComparison, TrendAnalysis, TrendDirection,
    UtcDateTime, Valuation, ValuationConfidence,
};

// Envelope
pub use envelope::GatewayResponse;

// Errors
pub use error::{CoreError, ValidationError};

// Gateways
pub use gateway::{
    guarded_call, FacetError, GatewayBuilder, Gateways, MarketDataGateway, PropertyDataGateway,
    SERVICE_UNAVAILABLE,
};

// HTTP transport
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Normalization
pub use normalize::NormalizationError;

// Rollout
pub use rollout::{
    rolling_hash, select_provider, RolloutFlag, RolloutFlagSource, StaticFlagSource,
    StoreFlagSource,
};

// Warehouse types used in public signatures
pub use propdata_store::{Store, StoreConfig, StoreError};
