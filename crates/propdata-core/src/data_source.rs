//! Vendor client contracts and the vendor-shaped records they return.
//!
//! | Trait | Operations | Real | Mock |
//! |-------|------------|------|------|
//! | [`PropertyDataSource`] | match, attributes, sales, AVM | `CoreLogicClient` | `MockPropertyClient` |
//! | [`MarketDataSource`] | statistics, history, snapshot, comparison, trends | `ReinzClient` | `MockMarketClient` |
//!
//! Records mirror vendor payloads loosely: every field is optional and the
//! normalizer decides which ones are mandatory.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::http_client::HttpError;
use crate::{MarketQuery, PropertyQuery, ProviderKind};

/// Vendor call error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    InvalidRequest,
    Authentication,
    Upstream,
    Timeout,
    Transport,
    Malformed,
    CircuitOpen,
    RateLimited,
    NotFound,
}

/// Structured vendor error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    status: Option<u16>,
    // Already recorded on the authentication circuit.
    token_exchange: bool,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            token_exchange: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Authentication, message)
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(SourceErrorKind::Upstream, message)
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Transport, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Malformed, message)
    }

    pub fn circuit_open(circuit: &str) -> Self {
        Self::new(
            SourceErrorKind::CircuitOpen,
            format!("circuit '{circuit}' is open"),
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message)
    }

    pub fn from_http(vendor: &str, error: &HttpError) -> Self {
        if error.is_timeout() {
            Self::timeout(format!("{vendor} request timed out: {}", error.message()))
        } else {
            Self::transport(format!("{vendor} transport error: {}", error.message()))
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Marks an error raised while obtaining a token.
    ///
    /// The authentication circuit owns these; endpoint and global circuits
    /// treat them as neutral.
    pub fn from_token_exchange(mut self) -> Self {
        self.token_exchange = true;
        self
    }

    pub const fn is_token_exchange(&self) -> bool {
        self.token_exchange
    }

    /// Whether a breaker should record this outcome as a failure.
    pub const fn counts_as_failure(&self) -> bool {
        !self.token_exchange
            && !matches!(
                self.kind,
                SourceErrorKind::InvalidRequest
                    | SourceErrorKind::CircuitOpen
                    | SourceErrorKind::RateLimited
                    | SourceErrorKind::NotFound
            )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Authentication => "source.authentication",
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Transport => "source.transport",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::CircuitOpen => "source.circuit_open",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::NotFound => "source.not_found",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Property vendor contract.
pub trait PropertyDataSource: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Best vendor match for a free-text address; `NotFound` when nothing matches.
    fn match_address<'a>(
        &'a self,
        query: &'a PropertyQuery,
    ) -> SourceFuture<'a, VendorAddressMatch>;

    fn property_attributes<'a>(
        &'a self,
        property_id: &'a str,
    ) -> SourceFuture<'a, VendorPropertyRecord>;

    fn sales_history<'a>(&'a self, property_id: &'a str) -> SourceFuture<'a, VendorSalesRecord>;

    fn avm<'a>(&'a self, property_id: &'a str) -> SourceFuture<'a, VendorAvmRecord>;
}

/// Market vendor contract.
pub trait MarketDataSource: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn market_statistics<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketStatistics>;

    fn historical_market_data<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketSeries>;

    fn market_snapshot<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketSnapshot>;

    fn suburb_comparison<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorSuburbComparison>;

    fn trend_analysis<'a>(&'a self, query: &'a MarketQuery) -> SourceFuture<'a, VendorTrendReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorAddressMatch {
    pub property_id: Option<String>,
    pub matched_address: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorAddress {
    pub full_address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorAttributes {
    pub property_type: Option<String>,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub car_spaces: Option<u8>,
    pub land_area: Option<f64>,
    pub floor_area: Option<f64>,
    pub year_built: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorPropertyRecord {
    pub property_id: Option<String>,
    pub address: Option<VendorAddress>,
    pub attributes: Option<VendorAttributes>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorSale {
    pub contract_date: Option<String>,
    pub price: Option<f64>,
    pub sale_method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorSalesRecord {
    pub property_id: Option<String>,
    pub sales: Vec<VendorSale>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorAvmRecord {
    pub property_id: Option<String>,
    pub estimate: Option<f64>,
    pub low_estimate: Option<f64>,
    pub high_estimate: Option<f64>,
    pub confidence_score: Option<f64>,
    pub valuation_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorMarketStatistics {
    pub median_price: Option<f64>,
    pub mean_price: Option<f64>,
    pub sales_volume: Option<u32>,
    pub median_days_to_sell: Option<u32>,
    pub price_change_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorMonth {
    pub month: Option<String>,
    pub median_price: Option<f64>,
    pub sales_volume: Option<u32>,
}

/// Monthly series, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorMarketSeries {
    pub months: Vec<VendorMonth>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorMarketSnapshot {
    pub median_price: Option<f64>,
    pub active_listings: Option<u32>,
    pub median_days_to_sell: Option<u32>,
    pub clearance_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorNeighbour {
    pub suburb: Option<String>,
    pub median_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorSuburbComparison {
    pub suburb_median: Option<f64>,
    pub city_median: Option<f64>,
    pub neighbours: Vec<VendorNeighbour>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorTrendReport {
    pub months: Vec<VendorMonth>,
    /// Vendor-computed change over the period; derived from the series when absent.
    pub change_percent: Option<f64>,
}
