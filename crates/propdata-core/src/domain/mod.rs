//! Canonical domain models and validated request types.

mod models;
mod request;
mod timestamp;

pub use models::{
    AddressMatch, FacetNotice, MarketReport, MarketSnapshot, MarketStatistics, MarketTemperature,
    MonthlyMarketPoint, NeighbourMedian, PropertyAttributes, PropertyReport, ProviderKind,
    SaleRecord, SalesHistory, SuburbComparison, TrendAnalysis, TrendDirection, Valuation,
    ValuationConfidence,
};
pub use request::{
    MarketDataRequest, MarketFacet, MarketQuery, PropertyDataRequest, PropertyFacet,
    PropertyQuery, ALL_SENTINEL, DEFAULT_PERIOD_MONTHS,
};
pub use timestamp::UtcDateTime;
