use std::sync::Arc;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{
    MarketDataSource, SourceFuture, VendorMarketSeries, VendorMarketSnapshot,
    VendorMarketStatistics, VendorSuburbComparison, VendorTrendReport,
};
use crate::http_client::HttpClient;
use crate::{MarketQuery, ProviderKind};

use super::{VendorConfig, VendorTransport};

/// Real REINZ market client.
pub struct ReinzClient {
    transport: VendorTransport,
}

impl ReinzClient {
    pub fn new(config: VendorConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            transport: VendorTransport::new(config, http_client, None),
        }
    }

    pub fn with_auth_breaker(
        config: VendorConfig,
        http_client: Arc<dyn HttpClient>,
        auth_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            transport: VendorTransport::new(config, http_client, Some(auth_breaker)),
        }
    }
}

fn market_params(query: &MarketQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("suburb", query.suburb.clone()),
        ("city", query.city.clone()),
        ("period", query.period_months.to_string()),
    ];
    if let Some(property_type) = &query.property_type {
        params.push(("propertyType", property_type.clone()));
    }
    if let Some(bedrooms) = query.bedrooms {
        params.push(("bedrooms", bedrooms.to_string()));
    }
    params
}

impl MarketDataSource for ReinzClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Real
    }

    fn market_statistics<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketStatistics> {
        Box::pin(async move {
            self.transport
                .get_json("/v1/market/statistics", &market_params(query))
                .await
        })
    }

    fn historical_market_data<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketSeries> {
        Box::pin(async move {
            self.transport
                .get_json("/v1/market/history", &market_params(query))
                .await
        })
    }

    fn market_snapshot<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketSnapshot> {
        Box::pin(async move {
            self.transport
                .get_json("/v1/market/snapshot", &market_params(query))
                .await
        })
    }

    fn suburb_comparison<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorSuburbComparison> {
        Box::pin(async move {
            self.transport
                .get_json("/v1/market/comparison", &market_params(query))
                .await
        })
    }

    fn trend_analysis<'a>(&'a self, query: &'a MarketQuery) -> SourceFuture<'a, VendorTrendReport> {
        Box::pin(async move {
            self.transport
                .get_json("/v1/market/trends", &market_params(query))
                .await
        })
    }
}
