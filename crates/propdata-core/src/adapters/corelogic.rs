use std::sync::Arc;

use serde::Deserialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{
    PropertyDataSource, SourceError, SourceFuture, VendorAddressMatch, VendorAvmRecord,
    VendorPropertyRecord, VendorSalesRecord,
};
use crate::http_client::HttpClient;
use crate::{PropertyQuery, ProviderKind};

use super::{encode_segment, VendorConfig, VendorTransport};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MatchResponse {
    matches: Vec<VendorAddressMatch>,
}

/// Real CoreLogic property client.
pub struct CoreLogicClient {
    transport: VendorTransport,
}

impl CoreLogicClient {
    pub fn new(config: VendorConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            transport: VendorTransport::new(config, http_client, None),
        }
    }

    /// Token exchanges are guarded by `auth_breaker`.
    pub fn with_auth_breaker(
        config: VendorConfig,
        http_client: Arc<dyn HttpClient>,
        auth_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            transport: VendorTransport::new(config, http_client, Some(auth_breaker)),
        }
    }

    fn property_path(property_id: &str, resource: &str) -> Result<String, SourceError> {
        let property_id = property_id.trim();
        if property_id.is_empty() {
            return Err(SourceError::invalid_request(
                "corelogic request requires a property id",
            ));
        }
        Ok(format!(
            "/property-details/nz/properties/{}/{resource}",
            encode_segment(property_id)
        ))
    }
}

impl PropertyDataSource for CoreLogicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Real
    }

    fn match_address<'a>(
        &'a self,
        query: &'a PropertyQuery,
    ) -> SourceFuture<'a, VendorAddressMatch> {
        Box::pin(async move {
            let Some(address) = query.address.as_deref() else {
                return Err(SourceError::invalid_request(
                    "corelogic address match requires an address",
                ));
            };

            let mut params = vec![("q", address.to_owned())];
            if let Some(suburb) = &query.suburb {
                params.push(("suburb", suburb.clone()));
            }
            if let Some(city) = &query.city {
                params.push(("city", city.clone()));
            }
            if let Some(postcode) = &query.postcode {
                params.push(("postcode", postcode.clone()));
            }

            let response: MatchResponse = self
                .transport
                .get_json("/search/nz/matcher/address", &params)
                .await?;

            response
                .matches
                .into_iter()
                .filter(|candidate| candidate.property_id.is_some())
                .max_by(|left, right| {
                    left.confidence
                        .unwrap_or(0.0)
                        .total_cmp(&right.confidence.unwrap_or(0.0))
                })
                .ok_or_else(|| {
                    SourceError::not_found(format!("no corelogic match for '{address}'"))
                })
        })
    }

    fn property_attributes<'a>(
        &'a self,
        property_id: &'a str,
    ) -> SourceFuture<'a, VendorPropertyRecord> {
        Box::pin(async move {
            let path = Self::property_path(property_id, "attributes")?;
            self.transport.get_json(&path, &[]).await
        })
    }

    fn sales_history<'a>(&'a self, property_id: &'a str) -> SourceFuture<'a, VendorSalesRecord> {
        Box::pin(async move {
            let path = Self::property_path(property_id, "sales")?;
            self.transport.get_json(&path, &[]).await
        })
    }

    fn avm<'a>(&'a self, property_id: &'a str) -> SourceFuture<'a, VendorAvmRecord> {
        Box::pin(async move {
            let property_id = property_id.trim();
            if property_id.is_empty() {
                return Err(SourceError::invalid_request(
                    "corelogic avm requires a property id",
                ));
            }
            let path = format!(
                "/avm/nz/properties/{}/avm/current",
                encode_segment(property_id)
            );
            self.transport.get_json(&path, &[]).await
        })
    }
}
