//! Behaviour tests for gateway orchestration: validation, provider
//! selection, caching and graceful degradation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use propdata_core::rollout::{RolloutFlagSource, MARKET_DATA_FLAG};
use propdata_core::{CoreError, MarketFacet, PropertyFacet};
use propdata_tests::*;

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn when_city_is_missing_gateway_rejects_without_touching_vendor() {
    // Given: A market gateway whose real vendor counts calls
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();

    // When: The caller omits the city
    let response = gateways
        .market
        .fetch(&MarketDataRequest::new("Ponsonby", "  "), CacheMode::Use)
        .await;

    // Then: A failed envelope names the field and the vendor was never called
    let json = serde_json::to_value(&response).expect("serializable");
    assert_eq!(
        json,
        serde_json::json!({
            "success": false,
            "error": "Missing required parameters: city"
        })
    );
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn when_property_request_has_neither_address_nor_id_gateway_rejects_it() {
    // Given: A property gateway
    let gateways = GatewayBuilder::new(quiet_settings()).build();

    // When: The request carries only locality
    let request = PropertyDataRequest {
        suburb: Some(String::from("Ponsonby")),
        city: Some(String::from("Auckland")),
        ..PropertyDataRequest::default()
    };
    let response = gateways.property.fetch(&request, CacheMode::Use).await;

    // Then: The envelope explains what is missing
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Missing required parameters: address or propertyId")
    );
}

// =============================================================================
// Provider selection
// =============================================================================

#[tokio::test]
async fn when_flag_is_disabled_ponsonby_is_served_by_reproducible_mock_data() {
    // Given: Two independent gateways with no rollout flag configured
    let request = MarketDataRequest::new("Ponsonby", "Auckland")
        .with_property_type("house")
        .with_period(12);
    let first_gateways = GatewayBuilder::new(quiet_settings()).build();
    let second_gateways = GatewayBuilder::new(quiet_settings()).build();

    // When: Each gateway serves the same request
    let first = first_gateways
        .market
        .fetch(&request, CacheMode::Use)
        .await
        .into_result()
        .expect("mock data succeeds");
    let second = second_gateways
        .market
        .fetch(&request, CacheMode::Use)
        .await
        .into_result()
        .expect("mock data succeeds");

    // Then: The mock served both and every data facet is identical
    assert_eq!(first.provider, ProviderKind::Mock);
    assert_eq!(first.suburb, "Ponsonby");
    assert_eq!(first.city, "Auckland");
    assert_eq!(first.property_type.as_deref(), Some("house"));
    assert_eq!(first.period_months, 12);
    assert!(first.unavailable.is_empty());

    assert_eq!(first.statistics, second.statistics);
    assert_eq!(first.snapshot, second.snapshot);
    assert_eq!(first.comparison, second.comparison);
    assert_eq!(first.trends, second.trends);
    assert_eq!(first.history, second.history);

    let statistics = first.statistics.expect("statistics are always present");
    assert!(statistics.median_price > 0.0);
}

#[tokio::test]
async fn when_rollout_is_zero_percent_no_key_reaches_the_real_vendor() {
    // Given: An enabled flag at 0%
    let source = CountingMarketSource::new();
    let flags = StaticFlagSource::new().with_flag(
        MARKET_DATA_FLAG,
        RolloutFlag::new(true, 0).expect("valid flag"),
    );
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(Arc::new(flags))
        .with_real_market_source(source.clone())
        .build();

    // When: Many different suburbs are requested
    for suburb in ["Ponsonby", "Grey Lynn", "Remuera", "Mt Eden", "Parnell", "Herne Bay"] {
        let report = gateways
            .market
            .fetch(&MarketDataRequest::new(suburb, "Auckland"), CacheMode::Bypass)
            .await
            .into_result()
            .expect("mock succeeds");

        // Then: Every one is served by the mock
        assert_eq!(report.provider, ProviderKind::Mock, "{suburb}");
    }
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn when_rollout_is_full_every_key_reaches_the_real_vendor() {
    // Given: An enabled flag at 100%
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();

    // When: Several suburbs are requested
    let suburbs = ["Ponsonby", "Grey Lynn", "Remuera"];
    for suburb in suburbs {
        let report = gateways
            .market
            .fetch(&MarketDataRequest::new(suburb, "Auckland"), CacheMode::Bypass)
            .await
            .into_result()
            .expect("real source succeeds");

        // Then: The real source serves each one
        assert_eq!(report.provider, ProviderKind::Real, "{suburb}");
    }
    assert_eq!(source.statistics_calls(), suburbs.len());
}

#[tokio::test]
async fn when_force_mock_is_set_full_rollout_is_ignored() {
    // Given: A full rollout but an operator forcing mock mode
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings().with_force_mock(true))
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();

    // When: A request is served
    let report = gateways
        .market
        .fetch(&MarketDataRequest::new("Ponsonby", "Auckland"), CacheMode::Use)
        .await
        .into_result()
        .expect("mock succeeds");

    // Then: The real vendor is never called
    assert_eq!(report.provider, ProviderKind::Mock);
    assert_eq!(source.total_calls(), 0);
}

struct BrokenFlagSource;

impl RolloutFlagSource for BrokenFlagSource {
    fn flag<'a>(
        &'a self,
        _id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RolloutFlag>, CoreError>> + Send + 'a>> {
        Box::pin(async { Err(CoreError::Task(String::from("flag store offline"))) })
    }
}

#[tokio::test]
async fn when_flag_lookup_fails_gateway_falls_back_to_mock() {
    // Given: A flag source that always errors
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(Arc::new(BrokenFlagSource))
        .with_real_market_source(source.clone())
        .build();

    // When: A request is served
    let report = gateways
        .market
        .fetch(&MarketDataRequest::new("Ponsonby", "Auckland"), CacheMode::Use)
        .await
        .into_result()
        .expect("mock succeeds");

    // Then: The lookup failure is treated as a disabled flag
    assert_eq!(report.provider, ProviderKind::Mock);
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn when_real_vendor_is_not_configured_selected_keys_use_mock() {
    // Given: A full rollout but no real property client
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .build();

    // When: A property is requested by id
    let report = gateways
        .property
        .fetch(&PropertyDataRequest::by_property_id("CL-000000777"), CacheMode::Use)
        .await
        .into_result()
        .expect("mock succeeds");

    // Then: The mock serves it
    assert_eq!(report.provider, ProviderKind::Mock);
    assert!(report.attributes.is_some());
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn when_same_request_repeats_within_ttl_vendor_is_called_once() {
    // Given: A gateway with a real market source
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let request = MarketDataRequest::new("Ponsonby", "Auckland").with_property_type("House");

    // When: The same request is served twice
    let first = gateways.market.fetch(&request, CacheMode::Use).await;
    let second = gateways.market.fetch(&request, CacheMode::Use).await;

    // Then: Both envelopes are byte-identical and the vendor saw one round-trip
    let first_json = serde_json::to_string(&first).expect("serializable");
    let second_json = serde_json::to_string(&second).expect("serializable");
    assert!(first.success);
    assert_eq!(first_json, second_json);
    assert_eq!(source.statistics_calls(), 1);
    assert_eq!(source.total_calls(), 5);
}

#[tokio::test]
async fn when_cache_key_differs_only_in_case_entry_is_shared() {
    // Given: A gateway with a real market source
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();

    // When: Requests differ only in letter case and defaulted period
    let _ = gateways
        .market
        .fetch(&MarketDataRequest::new("Ponsonby", "Auckland"), CacheMode::Use)
        .await;
    let _ = gateways
        .market
        .fetch(&MarketDataRequest::new("PONSONBY", "auckland").with_period(12), CacheMode::Use)
        .await;

    // Then: The second is a cache hit
    assert_eq!(source.statistics_calls(), 1);
}

#[tokio::test]
async fn when_ttl_expires_next_request_fetches_again() {
    // Given: A cache with a very short TTL
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_cache(ResponseCache::in_memory(Duration::from_millis(50)))
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let request = MarketDataRequest::new("Grey Lynn", "Auckland");

    // When: The request repeats after the TTL has passed
    let _ = gateways.market.fetch(&request, CacheMode::Use).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    let _ = gateways.market.fetch(&request, CacheMode::Use).await;

    // Then: The vendor was called both times
    assert_eq!(source.statistics_calls(), 2);
}

#[tokio::test]
async fn when_refresh_mode_is_used_cache_is_skipped_but_rewritten() {
    // Given: A cached response
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let request = MarketDataRequest::new("Remuera", "Auckland");
    let _ = gateways.market.fetch(&request, CacheMode::Use).await;

    // When: The caller asks for a refresh, then a normal read
    let refreshed = gateways.market.fetch(&request, CacheMode::Refresh).await;
    let cached = gateways.market.fetch(&request, CacheMode::Use).await;

    // Then: Only the refresh reached the vendor and its result is what is cached
    assert_eq!(source.statistics_calls(), 2);
    assert_eq!(refreshed, cached);
}

#[tokio::test]
async fn when_required_facet_fails_envelope_is_not_cached() {
    // Given: A real source whose statistics endpoint is down
    let source = CountingMarketSource::new();
    source.set_failing(true);
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let request = MarketDataRequest::new("Parnell", "Auckland");

    // When: The request fails, the vendor recovers and the request repeats
    let failed = gateways.market.fetch(&request, CacheMode::Use).await;
    source.set_failing(false);
    let recovered = gateways.market.fetch(&request, CacheMode::Use).await;

    // Then: The failure was returned once and never served from cache
    assert!(!failed.success);
    assert!(failed
        .error
        .as_deref()
        .is_some_and(|error| error.starts_with("statistics unavailable")));
    assert!(recovered.success);
    assert_eq!(source.statistics_calls(), 2);
}

// =============================================================================
// Degradation
// =============================================================================

#[tokio::test]
async fn when_optional_circuit_is_open_report_omits_that_facet() {
    // Given: The comparison circuit is already open
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let breaker = gateways.registry().breaker(MarketFacet::Comparison.circuit());
    for _ in 0..5 {
        breaker.record_failure();
    }

    // When: A market report is requested
    let report = gateways
        .market
        .fetch(&MarketDataRequest::new("Herne Bay", "Auckland"), CacheMode::Use)
        .await
        .into_result()
        .expect("comparison is optional");

    // Then: Comparison is absent with a notice and the vendor skipped it
    assert!(report.comparison.is_none());
    assert!(report.statistics.is_some());
    assert_eq!(report.unavailable.len(), 1);
    assert_eq!(report.unavailable[0].facet, "comparison");
    assert_eq!(report.unavailable[0].reason, propdata_core::SERVICE_UNAVAILABLE);
    assert_eq!(source.total_calls(), 4);
}

#[tokio::test]
async fn when_property_requires_avm_and_its_circuit_is_open_request_fails() {
    // Given: The avm circuit is open
    let source = CountingPropertySource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_property_source(source.clone())
        .build();
    let breaker = gateways.registry().breaker(PropertyFacet::Avm.circuit());
    for _ in 0..5 {
        breaker.record_failure();
    }

    // When: The caller requires a valuation
    let request = PropertyDataRequest::by_property_id("CL-000000123").requiring(PropertyFacet::Avm);
    let response = gateways.property.fetch(&request, CacheMode::Use).await;

    // Then: The whole request fails with the breaker message
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("avm unavailable: service temporarily unavailable")
    );
}

#[tokio::test]
async fn when_address_is_given_property_is_matched_then_enriched() {
    // Given: A real property source
    let source = CountingPropertySource::new();
    let gateways = GatewayBuilder::new(quiet_settings())
        .with_flag_source(all_real_flags())
        .with_real_property_source(source.clone())
        .build();

    // When: A property is requested by address
    let request = PropertyDataRequest::by_address("12 Ponsonby Road").with_locality(
        "Ponsonby",
        "Auckland",
        Some(String::from("1011")),
    );
    let report = gateways
        .property
        .fetch(&request, CacheMode::Use)
        .await
        .into_result()
        .expect("all facets succeed");

    // Then: Match, attributes, sales and valuation are all present
    let matched = report.matched.expect("address was matched");
    assert_eq!(report.property_id.as_deref(), Some(matched.property_id.as_str()));
    assert!(report.attributes.is_some());
    assert!(report.sales.is_some());
    assert!(report.valuation.is_some());
    assert_eq!(report.provider, ProviderKind::Real);
    assert_eq!(source.calls(), 4);
}
