use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::cache::CacheMode;
use crate::data_source::PropertyDataSource;
use crate::envelope::GatewayResponse;
use crate::normalize;
use crate::rollout::PROPERTY_DATA_FLAG;
use crate::{PropertyDataRequest, PropertyFacet, PropertyReport, ProviderKind, UtcDateTime};

use super::{FacetCollector, FacetError, GatewayContext};

/// Property attributes, sales and valuation for one request.
///
/// Address-only requests are resolved to a vendor property id first; the
/// remaining facets run concurrently against that id.
pub struct PropertyDataGateway {
    context: GatewayContext,
    mock: Arc<dyn PropertyDataSource>,
    real: Option<Arc<dyn PropertyDataSource>>,
}

impl PropertyDataGateway {
    pub(super) fn new(
        context: GatewayContext,
        mock: Arc<dyn PropertyDataSource>,
        real: Option<Arc<dyn PropertyDataSource>>,
    ) -> Self {
        Self { context, mock, real }
    }

    pub async fn fetch(
        &self,
        request: &PropertyDataRequest,
        mode: CacheMode,
    ) -> GatewayResponse<PropertyReport> {
        let span = tracing::info_span!("gateway", request_id = %Uuid::new_v4(), kind = "property");
        self.fetch_inner(request, mode).instrument(span).await
    }

    async fn fetch_inner(
        &self,
        request: &PropertyDataRequest,
        mode: CacheMode,
    ) -> GatewayResponse<PropertyReport> {
        let query = match request.normalize() {
            Ok(query) => query,
            Err(error) => {
                tracing::debug!(%error, "property request rejected");
                return GatewayResponse::failure(error.to_string());
            }
        };

        let cache_key = query.cache_key();
        if mode.reads() {
            let cached = self
                .context
                .cache
                .lookup::<GatewayResponse<PropertyReport>>(&cache_key)
                .await;
            if let Some(cached) = cached {
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
            .provider_for(PROPERTY_DATA_FLAG, &query.rollout_key(), self.real.is_some())
            .await;
        let source = match (provider, &self.real) {
            (ProviderKind::Real, Some(real)) => Arc::clone(real),
            _ => Arc::clone(&self.mock),
        };
        tracing::info!(cache_key = %cache_key, provider = %provider, "fetching property data");

        let context = &self.context;
        let mut collector = FacetCollector::default();

        let (property_id, matched) = match &query.property_id {
            Some(property_id) => (property_id.clone(), None),
            None => {
                let matched = context
                    .run_facet(
                        provider,
                        PropertyFacet::Match.circuit(),
                        source.match_address(&query),
                    )
                    .await
                    .and_then(|record| normalize::address_match(record).map_err(FacetError::from));
                let matched = collector.take(
                    PropertyFacet::Match.as_str(),
                    query.is_required(PropertyFacet::Match),
                    matched,
                );
                match matched {
                    Some(matched) => (matched.property_id.clone(), Some(matched)),
                    None => {
                        let failure = collector.into_failure().err().unwrap_or_else(|| {
                            String::from("address could not be matched to a property")
                        });
                        return GatewayResponse::failure(failure);
                    }
                }
            }
        };
        tracing::debug!(property_id = %property_id, "property resolved");

        let id = property_id.as_str();
        let query_ref = &query;
        let (attributes, sales, valuation) = tokio::join!(
            async {
                context
                    .run_facet(
                        provider,
                        PropertyFacet::Attributes.circuit(),
                        source.property_attributes(id),
                    )
                    .await
                    .and_then(|record| {
                        normalize::property_attributes(record, query_ref).map_err(FacetError::from)
                    })
            },
            async {
                context
                    .run_facet(provider, PropertyFacet::Sales.circuit(), source.sales_history(id))
                    .await
                    .map(|record| normalize::sales_history(record, id))
            },
            async {
                context
                    .run_facet(provider, PropertyFacet::Avm.circuit(), source.avm(id))
                    .await
                    .and_then(|record| normalize::valuation(record, id).map_err(FacetError::from))
            },
        );

        let attributes = collector.take(
            PropertyFacet::Attributes.as_str(),
            query.is_required(PropertyFacet::Attributes),
            attributes,
        );
        let sales = collector.take(
            PropertyFacet::Sales.as_str(),
            query.is_required(PropertyFacet::Sales),
            sales,
        );
        let valuation = collector.take(
            PropertyFacet::Avm.as_str(),
            query.is_required(PropertyFacet::Avm),
            valuation,
        );

        let unavailable = match collector.into_failure() {
            Ok(unavailable) => unavailable,
            Err(failure) => return GatewayResponse::failure(failure),
        };

        let response = GatewayResponse::ok(PropertyReport {
            property_id: Some(property_id),
            provider,
            matched,
            attributes,
            sales,
            valuation,
            unavailable,
            generated_at: UtcDateTime::now(),
        });

        if mode.writes() {
            self.context.cache.store(&cache_key, &response).await;
        }
        response
    }
}
