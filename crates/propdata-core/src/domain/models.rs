use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{MarketFacet, PropertyFacet, UtcDateTime};

/// Which backend produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Mock,
    Real,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Real => "real",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving a free-text address to a vendor property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressMatch {
    pub property_id: String,
    pub matched_address: String,
    /// 0.0..=1.0
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAttributes {
    pub property_id: String,
    pub address: String,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub property_type: String,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub car_spaces: Option<u8>,
    pub land_area_sqm: Option<f64>,
    pub floor_area_sqm: Option<f64>,
    pub year_built: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    /// `YYYY-MM-DD`
    pub sale_date: String,
    pub price: f64,
    pub sale_type: Option<String>,
}

/// Sales ordered newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesHistory {
    pub property_id: String,
    pub sales: Vec<SaleRecord>,
    pub last_sale_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationConfidence {
    High,
    Medium,
    Low,
}

impl ValuationConfidence {
    /// Buckets a vendor confidence score in `0.0..=1.0`.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Automated valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub property_id: String,
    pub estimate: f64,
    pub low: f64,
    pub high: f64,
    pub confidence: ValuationConfidence,
    pub confidence_score: f64,
    pub valued_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatistics {
    pub suburb: String,
    pub city: String,
    pub property_type: Option<String>,
    pub bedrooms: Option<u8>,
    pub period_months: u16,
    pub median_price: f64,
    pub mean_price: Option<f64>,
    pub sales_count: u32,
    pub median_days_on_market: Option<u32>,
    pub price_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTemperature {
    Hot,
    Balanced,
    Cool,
}

impl MarketTemperature {
    /// Fast sales with strong clearance run hot; slow sales or weak clearance run cool.
    pub fn classify(days_on_market: u32, clearance_rate: Option<f64>) -> Self {
        let clearance = clearance_rate.unwrap_or(0.5);
        if days_on_market <= 28 && clearance >= 0.6 {
            Self::Hot
        } else if days_on_market >= 60 || clearance < 0.4 {
            Self::Cool
        } else {
            Self::Balanced
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub suburb: String,
    pub city: String,
    pub median_price: f64,
    pub active_listings: u32,
    pub days_on_market: u32,
    pub clearance_rate: Option<f64>,
    pub temperature: MarketTemperature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighbourMedian {
    pub suburb: String,
    pub median_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuburbComparison {
    pub suburb: String,
    pub city: String,
    pub suburb_median: f64,
    pub city_median: f64,
    /// Suburb median relative to the city median, in percent.
    pub difference_pct: f64,
    pub neighbours: Vec<NeighbourMedian>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl TrendDirection {
    pub const THRESHOLD_PCT: f64 = 2.0;

    pub fn from_change_pct(change_pct: f64) -> Self {
        if change_pct > Self::THRESHOLD_PCT {
            Self::Rising
        } else if change_pct < -Self::THRESHOLD_PCT {
            Self::Falling
        } else {
            Self::Stable
        }
    }
}

/// One month of market activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyMarketPoint {
    /// `YYYY-MM`
    pub month: String,
    pub median_price: f64,
    pub sales_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub suburb: String,
    pub city: String,
    pub period_months: u16,
    pub start_median: f64,
    pub end_median: f64,
    pub change_pct: f64,
    pub direction: TrendDirection,
    pub points: Vec<MonthlyMarketPoint>,
}

/// Why an optional facet is missing from a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetNotice {
    pub facet: String,
    pub reason: String,
}

/// Everything the market gateway assembled for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketReport {
    pub suburb: String,
    pub city: String,
    pub property_type: Option<String>,
    pub bedrooms: Option<u8>,
    pub period_months: u16,
    pub provider: ProviderKind,
    pub statistics: Option<MarketStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<MarketSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<SuburbComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<TrendAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<MonthlyMarketPoint>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<FacetNotice>,
    pub generated_at: UtcDateTime,
}

impl MarketReport {
    pub fn has_facet(&self, facet: MarketFacet) -> bool {
        match facet {
            MarketFacet::Statistics => self.statistics.is_some(),
            MarketFacet::History => self.history.is_some(),
            MarketFacet::Snapshot => self.snapshot.is_some(),
            MarketFacet::Comparison => self.comparison.is_some(),
            MarketFacet::Trends => self.trends.is_some(),
        }
    }
}

/// Everything the property gateway assembled for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyReport {
    pub property_id: Option<String>,
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<AddressMatch>,
    pub attributes: Option<PropertyAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales: Option<SalesHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<Valuation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<FacetNotice>,
    pub generated_at: UtcDateTime,
}

impl PropertyReport {
    pub fn has_facet(&self, facet: PropertyFacet) -> bool {
        match facet {
            PropertyFacet::Match => self.matched.is_some(),
            PropertyFacet::Attributes => self.attributes.is_some(),
            PropertyFacet::Sales => self.sales.is_some(),
            PropertyFacet::Avm => self.valuation.is_some(),
        }
    }
}
