use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::cache::CacheMode;
use crate::data_source::MarketDataSource;
use crate::envelope::GatewayResponse;
use crate::normalize;
use crate::rollout::MARKET_DATA_FLAG;
use crate::{MarketDataRequest, MarketFacet, MarketReport, ProviderKind, UtcDateTime};

use super::{FacetCollector, FacetError, GatewayContext};

/// Suburb-level market data for one request.
pub struct MarketDataGateway {
    context: GatewayContext,
    mock: Arc<dyn MarketDataSource>,
    real: Option<Arc<dyn MarketDataSource>>,
}

impl MarketDataGateway {
    pub(super) fn new(
        context: GatewayContext,
        mock: Arc<dyn MarketDataSource>,
        real: Option<Arc<dyn MarketDataSource>>,
    ) -> Self {
        Self { context, mock, real }
    }

    pub async fn fetch(
        &self,
        request: &MarketDataRequest,
        mode: CacheMode,
    ) -> GatewayResponse<MarketReport> {
        let span = tracing::info_span!("gateway", request_id = %Uuid::new_v4(), kind = "market");
        self.fetch_inner(request, mode).instrument(span).await
    }

    async fn fetch_inner(
        &self,
        request: &MarketDataRequest,
        mode: CacheMode,
    ) -> GatewayResponse<MarketReport> {
        let query = match request.normalize() {
            Ok(query) => query,
            Err(error) => {
                tracing::debug!(%error, "market request rejected");
                return GatewayResponse::failure(error.to_string());
            }
        };

        let cache_key = query.cache_key();
        if mode.reads() {
            let cached = self
                .context
                .cache
                .lookup::<GatewayResponse<MarketReport>>(&cache_key)
                .await;
            if let Some(cached) = cached {
                // A degraded entry cannot answer a request that requires what it lacks.
                let covers_required = cached.data.as_ref().is_some_and(|report| {
                    query.required.iter().all(|facet| report.has_facet(*facet))
                });
                if covers_required {
                    tracing::debug!(cache_key = %cache_key, "cache hit");
                    return cached;
                }
                tracing::debug!(cache_key = %cache_key, "cached report lacks a required facet");
            }
        }

        let provider = self
            .context
            .provider_for(MARKET_DATA_FLAG, &query.rollout_key(), self.real.is_some())
            .await;
        let source = match (provider, &self.real) {
            (ProviderKind::Real, Some(real)) => Arc::clone(real),
            _ => Arc::clone(&self.mock),
        };
        tracing::info!(cache_key = %cache_key, provider = %provider, "fetching market data");

        let context = &self.context;
        let query_ref = &query;
        let (statistics, history, snapshot, comparison, trends) = tokio::join!(
            async {
                context
                    .run_facet(
                        provider,
                        MarketFacet::Statistics.circuit(),
                        source.market_statistics(query_ref),
                    )
                    .await
                    .and_then(|record| {
                        normalize::market_statistics(record, query_ref).map_err(FacetError::from)
                    })
            },
            async {
                context
                    .run_facet(
                        provider,
                        MarketFacet::History.circuit(),
                        source.historical_market_data(query_ref),
                    )
                    .await
                    .and_then(|record| normalize::market_history(record).map_err(FacetError::from))
            },
            async {
                context
                    .run_facet(
                        provider,
                        MarketFacet::Snapshot.circuit(),
                        source.market_snapshot(query_ref),
                    )
                    .await
                    .and_then(|record| {
                        normalize::market_snapshot(record, query_ref).map_err(FacetError::from)
                    })
            },
            async {
                context
                    .run_facet(
                        provider,
                        MarketFacet::Comparison.circuit(),
                        source.suburb_comparison(query_ref),
                    )
                    .await
                    .and_then(|record| {
                        normalize::suburb_comparison(record, query_ref).map_err(FacetError::from)
                    })
            },
            async {
                context
                    .run_facet(
                        provider,
                        MarketFacet::Trends.circuit(),
                        source.trend_analysis(query_ref),
                    )
                    .await
                    .and_then(|record| {
                        normalize::trend_analysis(record, query_ref).map_err(FacetError::from)
                    })
            },
        );

        let mut collector = FacetCollector::default();
        let required = |facet| query.is_required(facet);
        let statistics = collector.take(
            MarketFacet::Statistics.as_str(),
            required(MarketFacet::Statistics),
            statistics,
        );
        let history = collector.take(
            MarketFacet::History.as_str(),
            required(MarketFacet::History),
            history,
        );
        let snapshot = collector.take(
            MarketFacet::Snapshot.as_str(),
            required(MarketFacet::Snapshot),
            snapshot,
        );
        let comparison = collector.take(
            MarketFacet::Comparison.as_str(),
            required(MarketFacet::Comparison),
            comparison,
        );
        let trends = collector.take(
            MarketFacet::Trends.as_str(),
            required(MarketFacet::Trends),
            trends,
        );

        let unavailable = match collector.into_failure() {
            Ok(unavailable) => unavailable,
            Err(failure) => return GatewayResponse::failure(failure),
        };

        let response = GatewayResponse::ok(MarketReport {
            suburb: query.suburb.clone(),
            city: query.city.clone(),
            property_type: query.property_type.clone(),
            bedrooms: query.bedrooms,
            period_months: query.period_months,
            provider,
            statistics,
            snapshot,
            comparison,
            trends,
            history,
            unavailable,
            generated_at: UtcDateTime::now(),
        });

        if mode.writes() {
            self.context.cache.store(&cache_key, &response).await;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::MockMarketClient;
    use crate::config::GatewaySettings;
    use crate::data_source::{
        SourceError, SourceFuture, VendorMarketSeries, VendorMarketSnapshot, VendorMarketStatistics,
        VendorSuburbComparison, VendorTrendReport,
    };
    use crate::gateway::{GatewayBuilder, SERVICE_UNAVAILABLE};
    use crate::rollout::{RolloutFlag, StaticFlagSource, MARKET_DATA_FLAG};
    use crate::{MarketQuery, MockLatency};

    /// Real-looking source whose statistics work and whose trends always fail.
    struct HalfBrokenSource {
        mock: MockMarketClient,
    }

    impl MarketDataSource for HalfBrokenSource {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Real
        }

        fn market_statistics<'a>(
            &'a self,
            query: &'a MarketQuery,
        ) -> SourceFuture<'a, VendorMarketStatistics> {
            self.mock.market_statistics(query)
        }

        fn historical_market_data<'a>(
            &'a self,
            query: &'a MarketQuery,
        ) -> SourceFuture<'a, VendorMarketSeries> {
            self.mock.historical_market_data(query)
        }

        fn market_snapshot<'a>(
            &'a self,
            query: &'a MarketQuery,
        ) -> SourceFuture<'a, VendorMarketSnapshot> {
            self.mock.market_snapshot(query)
        }

        fn suburb_comparison<'a>(
            &'a self,
            query: &'a MarketQuery,
        ) -> SourceFuture<'a, VendorSuburbComparison> {
            self.mock.suburb_comparison(query)
        }

        fn trend_analysis<'a>(
            &'a self,
            _query: &'a MarketQuery,
        ) -> SourceFuture<'a, VendorTrendReport> {
            Box::pin(async { Err(SourceError::upstream(503, "trends offline")) })
        }
    }

    fn gateway(real: Arc<dyn MarketDataSource>) -> MarketDataGateway {
        let flags = StaticFlagSource::new().with_flag(MARKET_DATA_FLAG, RolloutFlag::full());
        GatewayBuilder::new(GatewaySettings::default().with_mock_latency(MockLatency::none()))
            .with_flag_source(Arc::new(flags))
            .with_real_market_source(real)
            .build()
            .market
    }

    #[tokio::test]
    async fn missing_suburb_is_rejected_without_vendor_calls() {
        let gateway = gateway(Arc::new(HalfBrokenSource {
            mock: MockMarketClient::default(),
        }));

        let response = gateway
            .fetch(&MarketDataRequest::new("", "Auckland"), CacheMode::Use)
            .await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Missing required parameters: suburb"));
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn optional_facet_failure_degrades_to_notice() {
        let gateway = gateway(Arc::new(HalfBrokenSource {
            mock: MockMarketClient::default(),
        }));

        let response = gateway
            .fetch(&MarketDataRequest::new("Ponsonby", "Auckland"), CacheMode::Bypass)
            .await;

        let report = response.into_result().expect("statistics succeeded");
        assert_eq!(report.provider, ProviderKind::Real);
        assert!(report.statistics.is_some());
        assert!(report.trends.is_none());
        assert_eq!(report.unavailable.len(), 1);
        assert_eq!(report.unavailable[0].facet, "trends");
    }

    #[tokio::test]
    async fn required_facet_failure_fails_the_request() {
        let gateway = gateway(Arc::new(HalfBrokenSource {
            mock: MockMarketClient::default(),
        }));

        let request = MarketDataRequest::new("Ponsonby", "Auckland").requiring(MarketFacet::Trends);
        let response = gateway.fetch(&request, CacheMode::Use).await;

        assert!(!response.success);
        let error = response.error.expect("failure carries an error");
        assert!(error.starts_with("trends unavailable:"), "{error}");
    }

    #[tokio::test]
    async fn open_circuit_reports_service_unavailable() {
        let gateway = gateway(Arc::new(HalfBrokenSource {
            mock: MockMarketClient::default(),
        }));
        let breaker = gateway.context.registry.breaker(MarketFacet::Snapshot.circuit());
        for _ in 0..5 {
            breaker.record_failure();
        }

        let report = gateway
            .fetch(&MarketDataRequest::new("Grey Lynn", "Auckland"), CacheMode::Bypass)
            .await
            .into_result()
            .expect("snapshot is optional");

        assert!(report.snapshot.is_none());
        let notice = report
            .unavailable
            .iter()
            .find(|notice| notice.facet == "snapshot")
            .expect("snapshot notice");
        assert_eq!(notice.reason, SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn degraded_cache_entry_does_not_answer_a_request_requiring_the_missing_facet() {
        let gateway = gateway(Arc::new(HalfBrokenSource {
            mock: MockMarketClient::default(),
        }));
        let request = MarketDataRequest::new("Ponsonby", "Auckland");

        let degraded = gateway.fetch(&request, CacheMode::Use).await;
        let strict = gateway
            .fetch(&request.clone().requiring(MarketFacet::Trends), CacheMode::Use)
            .await;

        assert!(degraded.success);
        assert!(degraded.data.as_ref().is_some_and(|report| report.trends.is_none()));
        assert!(!strict.success);
        let error = strict.error.expect("failure carries an error");
        assert!(error.starts_with("trends unavailable:"), "{error}");
    }

    #[tokio::test]
    async fn cached_report_round_trips_through_json() {
        let gateway = gateway(Arc::new(HalfBrokenSource {
            mock: MockMarketClient::default(),
        }));
        let response = gateway
            .fetch(&MarketDataRequest::new("Ponsonby", "Auckland"), CacheMode::Bypass)
            .await;

        let json = serde_json::to_string(&response).expect("serializes");
        let back: GatewayResponse<MarketReport> = serde_json::from_str(&json).expect("parses");

        assert_eq!(back, response);
    }
}
