//! Behaviour tests for circuit breakers, the registry monitor and
//! breaker-driven gateway degradation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use propdata_core::{
    guarded_call, BreakerSettings, CircuitBreaker, CircuitBreakerConfig, CircuitState, FacetError,
    MarketFacet, PropertyFacet, StateChange,
};
use propdata_tests::*;

fn short_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(3, Duration::from_millis(1000), 2)
}

// =============================================================================
// State machine
// =============================================================================

#[tokio::test]
async fn when_threshold_is_reached_circuit_opens_then_probes_after_timeout() {
    // Given: A breaker with threshold 3, reset 1s, two half-open probes
    let breaker = CircuitBreaker::new("market-statistics", short_config());

    // When: Three consecutive failures are recorded
    for _ in 0..3 {
        assert!(breaker.allow_request());
        breaker.record_failure();
    }

    // Then: The circuit is open and rejects calls
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.allow_request());

    // When: The reset timeout elapses
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Then: The next request is admitted as a half-open probe
    assert!(breaker.allow_request());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    // When: One probe succeeds and the next fails
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_failure();

    // Then: Any half-open failure reopens the circuit
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.allow_request());
}

#[tokio::test]
async fn when_enough_probes_succeed_circuit_closes_with_clean_counters() {
    // Given: A breaker that has just moved to half-open
    let breaker = CircuitBreaker::new(
        "property-attributes",
        CircuitBreakerConfig::new(1, Duration::from_millis(20), 2),
    );
    breaker.record_failure();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(breaker.try_half_open());

    // When: Two probes are admitted and both succeed
    assert!(breaker.allow_request());
    assert!(breaker.allow_request());
    assert!(!breaker.allow_request(), "third probe exceeds the half-open budget");
    breaker.record_success();
    breaker.record_success();

    // Then: The circuit is closed with zeroed counters
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(snapshot.half_open_requests, 0);
}

#[test]
fn when_closed_success_clears_accumulated_failures() {
    // Given: A breaker one failure away from opening
    let breaker = CircuitBreaker::new("sales-history", short_config());
    breaker.record_failure();
    breaker.record_failure();

    // When: A success lands before the third failure
    breaker.record_success();
    breaker.record_failure();

    // Then: The count restarted and the circuit stays closed
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().failure_count, 1);
}

#[test]
fn when_circuit_is_open_rejections_are_counted_in_metrics() {
    // Given: An open breaker
    let breaker = CircuitBreaker::new(
        "trend-analysis",
        CircuitBreakerConfig::new(1, Duration::from_secs(60), 1),
    );
    assert!(breaker.allow_request());
    breaker.record_failure();

    // When: Callers keep trying
    for _ in 0..4 {
        assert!(!breaker.allow_request());
    }

    // Then: Metrics show one admitted request and four rejections
    let metrics = breaker.metrics();
    assert_eq!(metrics.name, "trend-analysis");
    assert_eq!(metrics.state, CircuitState::Open);
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.total_failures, 1);
    assert_eq!(metrics.rejected_requests, 4);
}

// =============================================================================
// Listeners
// =============================================================================

#[test]
fn when_state_changes_listeners_are_told_and_a_panicking_listener_is_contained() {
    // Given: One panicking listener registered before a recording listener
    let breaker =
        CircuitBreaker::new("avm", CircuitBreakerConfig::new(2, Duration::from_secs(60), 1));
    let seen: Arc<Mutex<Vec<StateChange>>> = Arc::new(Mutex::new(Vec::new()));
    breaker.on_state_change(|_| panic!("listener failure"));
    let recorder = Arc::clone(&seen);
    let id = breaker.on_state_change(move |change| {
        recorder.lock().expect("listener log").push(change.clone());
    });

    // When: The breaker opens and is then reset
    breaker.record_failure();
    breaker.record_failure();
    breaker.reset();

    // Then: Both transitions reached the recording listener
    let changes = seen.lock().expect("listener log").clone();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].circuit, "avm");
    assert_eq!((changes[0].from, changes[0].to), (CircuitState::Closed, CircuitState::Open));
    assert_eq!((changes[1].from, changes[1].to), (CircuitState::Open, CircuitState::Closed));

    // And: A removed listener hears nothing more
    assert!(breaker.remove_state_change_listener(id));
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(seen.lock().expect("listener log").len(), 2);
}

// =============================================================================
// Registry and monitor
// =============================================================================

#[tokio::test]
async fn when_monitor_runs_open_circuits_move_to_half_open_without_traffic() {
    // Given: A registry whose endpoint breakers reset after 30ms
    let settings = BreakerSettings {
        endpoint: CircuitBreakerConfig::new(1, Duration::from_millis(30), 1),
        ..BreakerSettings::default()
    };
    let registry = Arc::new(CircuitBreakerRegistry::new(settings));
    let breaker = registry.breaker("market-snapshot");
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    // When: The monitor ticks past the reset timeout
    let monitor = registry.start_monitor(Duration::from_millis(10));
    assert!(monitor.is_running());
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Then: The breaker is half-open even though nothing called it
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    monitor.stop().await;
}

#[test]
fn when_breakers_are_named_registry_returns_the_same_instance() {
    // Given: A registry with default settings
    let registry = CircuitBreakerRegistry::new(BreakerSettings::default());

    // When: The same endpoint is requested twice
    let first = registry.breaker("market-statistics");
    let second = registry.breaker("market-statistics");
    first.record_failure();

    // Then: Both handles observe the same state
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.snapshot().failure_count, 1);
    assert!(registry.names().contains(&String::from("market-statistics")));
}

// =============================================================================
// Gateway integration
// =============================================================================

#[tokio::test]
async fn when_statistics_keeps_failing_gateway_stops_calling_it() {
    // Given: Endpoint breakers at threshold 3 and a failing statistics endpoint
    let mut settings = quiet_settings();
    settings.breakers.endpoint = short_config();
    let source = CountingMarketSource::new();
    source.set_failing(true);
    let gateways = GatewayBuilder::new(settings)
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let request = MarketDataRequest::new("Mt Eden", "Auckland");

    // When: Three requests fail at the vendor
    for _ in 0..3 {
        let response = gateways.market.fetch(&request, CacheMode::Use).await;
        assert!(!response.success);
    }

    // Then: The statistics circuit is open
    let breaker = gateways.registry().breaker(MarketFacet::Statistics.circuit());
    assert_eq!(breaker.state(), CircuitState::Open);

    // When: A fourth request arrives
    let response = gateways.market.fetch(&request, CacheMode::Use).await;

    // Then: It fails fast without reaching the vendor
    assert_eq!(
        response.error.as_deref(),
        Some("statistics unavailable: service temporarily unavailable")
    );
    assert_eq!(source.statistics_calls(), 3);
}

#[tokio::test]
async fn when_vendor_recovers_probe_success_closes_the_circuit() {
    // Given: An open statistics circuit with a 50ms reset timeout
    let mut settings = quiet_settings();
    settings.breakers.endpoint = CircuitBreakerConfig::new(1, Duration::from_millis(50), 1);
    let source = CountingMarketSource::new();
    source.set_failing(true);
    let gateways = GatewayBuilder::new(settings)
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let request = MarketDataRequest::new("Kingsland", "Auckland");
    let _ = gateways.market.fetch(&request, CacheMode::Use).await;
    let breaker = gateways.registry().breaker(MarketFacet::Statistics.circuit());
    assert_eq!(breaker.state(), CircuitState::Open);

    // When: The vendor recovers and the reset timeout passes
    source.set_failing(false);
    tokio::time::sleep(Duration::from_millis(80)).await;
    let response = gateways.market.fetch(&request, CacheMode::Use).await;

    // Then: The probe succeeds and the circuit closes
    assert!(response.success);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(source.statistics_calls(), 2);
}

#[tokio::test]
async fn when_gateways_share_a_registry_an_open_circuit_applies_to_both() {
    // Given: Two gateway sets built over one registry
    let registry = Arc::new(CircuitBreakerRegistry::new(BreakerSettings::default()));
    let first_source = CountingMarketSource::new();
    let second_source = CountingMarketSource::new();
    let first = GatewayBuilder::new(quiet_settings())
        .with_registry(Arc::clone(&registry))
        .with_flag_source(all_real_flags())
        .with_real_market_source(first_source.clone())
        .build();
    let second = GatewayBuilder::new(quiet_settings())
        .with_registry(Arc::clone(&registry))
        .with_flag_source(all_real_flags())
        .with_real_market_source(second_source.clone())
        .build();

    // When: The trends circuit is opened through the first set
    let trends = first.registry().breaker(MarketFacet::Trends.circuit());
    for _ in 0..5 {
        trends.record_failure();
    }
    let report = second
        .market
        .fetch(&MarketDataRequest::new("Onehunga", "Auckland"), CacheMode::Bypass)
        .await
        .into_result()
        .expect("trends are optional");

    // Then: The second set also skips trends
    assert!(report.trends.is_none());
    assert_eq!(report.unavailable[0].facet, "trends");
    assert_eq!(second_source.total_calls(), 4);
    assert_eq!(first_source.total_calls(), 0);
}

#[tokio::test]
async fn when_mock_serves_traffic_breakers_see_nothing() {
    // Given: A gateway with no rollout flags
    let gateways = GatewayBuilder::new(quiet_settings()).build();

    // When: A mock-served request completes
    let response = gateways
        .market
        .fetch(&MarketDataRequest::new("Ponsonby", "Auckland"), CacheMode::Bypass)
        .await;

    // Then: No breaker recorded a request
    assert!(response.success);
    assert!(gateways
        .registry()
        .metrics_all()
        .iter()
        .all(|metrics| metrics.total_requests == 0));
}

#[tokio::test]
async fn when_a_half_open_fetch_is_dropped_its_slot_is_returned() {
    // Given: A half-open statistics circuit with room for one probe
    let mut settings = quiet_settings();
    settings.breakers.endpoint = CircuitBreakerConfig::new(1, Duration::from_millis(30), 1);
    let source = CountingMarketSource::new();
    let gateways = GatewayBuilder::new(settings)
        .with_flag_source(all_real_flags())
        .with_real_market_source(source.clone())
        .build();
    let breaker = gateways.registry().breaker(MarketFacet::Statistics.circuit());
    breaker.record_failure();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // When: The probing call hangs and the caller gives up on the fetch
    source.set_stalling(true);
    let request = MarketDataRequest::new("Sandringham", "Auckland");
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        gateways.market.fetch(&request, CacheMode::Bypass),
    )
    .await;

    // Then: The probe slot is free again and nothing was counted as a failure
    assert!(abandoned.is_err(), "fetch should still have been pending");
    assert_eq!(source.statistics_calls(), 1);
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::HalfOpen);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.half_open_requests, 0);
    assert_eq!(breaker.metrics().total_failures, 1);
    assert_eq!(gateways.registry().global().snapshot().failure_count, 0);

    // When: The vendor answers the next probe
    source.set_stalling(false);
    let response = gateways.market.fetch(&request, CacheMode::Bypass).await;

    // Then: The returned slot admitted it and the circuit closes
    assert!(response.success);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn when_failures_spread_across_endpoints_global_circuit_blocks_healthy_ones() {
    // Given: Lenient endpoint circuits under a global circuit that opens after three failures
    let mut settings = quiet_settings();
    settings.breakers.endpoint = CircuitBreakerConfig::new(5, Duration::from_secs(60), 1);
    settings.breakers.global = CircuitBreakerConfig::new(3, Duration::from_secs(60), 1);
    let property = CountingPropertySource::new();
    let gateways = GatewayBuilder::new(settings)
        .with_flag_source(all_real_flags())
        .with_real_property_source(property.clone())
        .build();
    let registry = gateways.registry();

    // When: Three different endpoints each fail once
    for circuit in [
        MarketFacet::Statistics.circuit(),
        MarketFacet::Trends.circuit(),
        PropertyFacet::Sales.circuit(),
    ] {
        let result: Result<(), FacetError> = guarded_call(registry, circuit, async {
            Err(SourceError::upstream(503, "vendor outage"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(registry.breaker(circuit).state(), CircuitState::Closed);
    }

    // Then: The global circuit is open
    assert_eq!(registry.global().state(), CircuitState::Open);

    // When: A request reaches an endpoint that never failed
    let response = gateways
        .property
        .fetch(&PropertyDataRequest::by_property_id("CL-000000042"), CacheMode::Bypass)
        .await;

    // Then: It is refused without reaching the vendor
    assert_eq!(
        response.error.as_deref(),
        Some("attributes unavailable: service temporarily unavailable")
    );
    assert_eq!(property.calls(), 0);
    let attributes = registry.breaker(PropertyFacet::Attributes.circuit()).snapshot();
    assert_eq!(attributes.state, CircuitState::Closed);
    assert_eq!(attributes.half_open_requests, 0);
}
