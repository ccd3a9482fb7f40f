//! Vendor records to canonical models.
//!
//! Every function is pure. A missing mandatory field is a [`NormalizationError`];
//! the gateway drops the facet, or fails the request when the facet is required.

use thiserror::Error;

use crate::data_source::{
    VendorAddressMatch, VendorAvmRecord, VendorMarketSeries, VendorMarketSnapshot,
    VendorMarketStatistics, VendorMonth, VendorPropertyRecord, VendorSalesRecord,
    VendorSuburbComparison, VendorTrendReport,
};
use crate::{
    AddressMatch, MarketQuery, MarketSnapshot, MarketStatistics, MarketTemperature,
    MonthlyMarketPoint, NeighbourMedian, PropertyAttributes, PropertyQuery, SaleRecord,
    SalesHistory, SuburbComparison, TrendAnalysis, TrendDirection, Valuation,
    ValuationConfidence,
};

const VALUATION_SPREAD: f64 = 0.10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("{record} is missing required field '{field}'")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{record} field '{field}' is invalid: {detail}")]
    InvalidValue {
        record: &'static str,
        field: &'static str,
        detail: String,
    },
}

fn required<T>(
    value: Option<T>,
    record: &'static str,
    field: &'static str,
) -> Result<T, NormalizationError> {
    value.ok_or(NormalizationError::MissingField { record, field })
}

fn positive(
    value: f64,
    record: &'static str,
    field: &'static str,
) -> Result<f64, NormalizationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(NormalizationError::InvalidValue {
            record,
            field,
            detail: format!("expected a positive amount, got {value}"),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent_change(start: f64, end: f64) -> f64 {
    round2((end - start) / start * 100.0)
}

pub fn address_match(record: VendorAddressMatch) -> Result<AddressMatch, NormalizationError> {
    const RECORD: &str = "address match";
    Ok(AddressMatch {
        property_id: required(record.property_id, RECORD, "propertyId")?,
        matched_address: required(record.matched_address, RECORD, "matchedAddress")?,
        score: record.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
    })
}

/// Locality the vendor leaves out is taken from the request.
pub fn property_attributes(
    record: VendorPropertyRecord,
    query: &PropertyQuery,
) -> Result<PropertyAttributes, NormalizationError> {
    const RECORD: &str = "property attributes";
    let property_id = required(record.property_id, RECORD, "propertyId")?;
    let address = record.address.unwrap_or_default();
    let attributes = required(record.attributes, RECORD, "attributes")?;

    let full_address = address
        .full_address
        .or_else(|| query.address.clone())
        .ok_or(NormalizationError::MissingField {
            record: RECORD,
            field: "address",
        })?;

    Ok(PropertyAttributes {
        property_id,
        address: full_address,
        suburb: address.suburb.or_else(|| query.suburb.clone()),
        city: address.city.or_else(|| query.city.clone()),
        postcode: address.postcode.or_else(|| query.postcode.clone()),
        property_type: required(attributes.property_type, RECORD, "propertyType")?.to_lowercase(),
        bedrooms: attributes.bedrooms,
        bathrooms: attributes.bathrooms,
        car_spaces: attributes.car_spaces,
        land_area_sqm: attributes.land_area.filter(|area| *area > 0.0),
        floor_area_sqm: attributes.floor_area.filter(|area| *area > 0.0),
        year_built: attributes.year_built,
    })
}

/// Sales without a date or price are dropped; the rest are ordered newest first.
pub fn sales_history(record: VendorSalesRecord, property_id: &str) -> SalesHistory {
    let mut sales: Vec<SaleRecord> = record
        .sales
        .into_iter()
        .filter_map(|sale| {
            let price = sale.price.filter(|price| price.is_finite() && *price > 0.0)?;
            Some(SaleRecord {
                sale_date: sale.contract_date?,
                price,
                sale_type: sale.sale_method,
            })
        })
        .collect();
    sales.sort_by(|left, right| right.sale_date.cmp(&left.sale_date));

    SalesHistory {
        property_id: record.property_id.unwrap_or_else(|| property_id.to_owned()),
        last_sale_price: sales.first().map(|sale| sale.price),
        sales,
    }
}

pub fn valuation(
    record: VendorAvmRecord,
    property_id: &str,
) -> Result<Valuation, NormalizationError> {
    const RECORD: &str = "avm";
    let estimate = positive(required(record.estimate, RECORD, "estimate")?, RECORD, "estimate")?;
    let low = record.low_estimate.unwrap_or(estimate * (1.0 - VALUATION_SPREAD));
    let high = record.high_estimate.unwrap_or(estimate * (1.0 + VALUATION_SPREAD));

    if !(low <= estimate && estimate <= high) {
        return Err(NormalizationError::InvalidValue {
            record: RECORD,
            field: "range",
            detail: format!("{low}..{high} does not contain {estimate}"),
        });
    }

    let confidence_score = record.confidence_score.unwrap_or(0.0).clamp(0.0, 1.0);
    Ok(Valuation {
        property_id: record.property_id.unwrap_or_else(|| property_id.to_owned()),
        estimate,
        low,
        high,
        confidence: ValuationConfidence::from_score(confidence_score),
        confidence_score,
        valued_on: record.valuation_date,
    })
}

pub fn market_statistics(
    record: VendorMarketStatistics,
    query: &MarketQuery,
) -> Result<MarketStatistics, NormalizationError> {
    const RECORD: &str = "market statistics";
    let median_price = positive(
        required(record.median_price, RECORD, "medianPrice")?,
        RECORD,
        "medianPrice",
    )?;

    Ok(MarketStatistics {
        suburb: query.suburb.clone(),
        city: query.city.clone(),
        property_type: query.property_type.clone(),
        bedrooms: query.bedrooms,
        period_months: query.period_months,
        median_price,
        mean_price: record.mean_price,
        sales_count: record.sales_volume.unwrap_or(0),
        median_days_on_market: record.median_days_to_sell,
        price_change_pct: record.price_change_percent.map(round2),
    })
}

fn monthly_points(months: Vec<VendorMonth>) -> Vec<MonthlyMarketPoint> {
    let mut points: Vec<MonthlyMarketPoint> = months
        .into_iter()
        .filter_map(|month| {
            Some(MonthlyMarketPoint {
                month: month.month?,
                median_price: month.median_price.filter(|price| *price > 0.0)?,
                sales_count: month.sales_volume.unwrap_or(0),
            })
        })
        .collect();
    points.sort_by(|left, right| left.month.cmp(&right.month));
    points
}

pub fn market_history(
    record: VendorMarketSeries,
) -> Result<Vec<MonthlyMarketPoint>, NormalizationError> {
    let points = monthly_points(record.months);
    if points.is_empty() {
        return Err(NormalizationError::MissingField {
            record: "market history",
            field: "months",
        });
    }
    Ok(points)
}

pub fn market_snapshot(
    record: VendorMarketSnapshot,
    query: &MarketQuery,
) -> Result<MarketSnapshot, NormalizationError> {
    const RECORD: &str = "market snapshot";
    let median_price = positive(
        required(record.median_price, RECORD, "medianPrice")?,
        RECORD,
        "medianPrice",
    )?;
    let days_on_market = required(record.median_days_to_sell, RECORD, "medianDaysToSell")?;
    let clearance_rate = record.clearance_rate.map(|rate| rate.clamp(0.0, 1.0));

    Ok(MarketSnapshot {
        suburb: query.suburb.clone(),
        city: query.city.clone(),
        median_price,
        active_listings: record.active_listings.unwrap_or(0),
        days_on_market,
        clearance_rate,
        temperature: MarketTemperature::classify(days_on_market, clearance_rate),
    })
}

pub fn suburb_comparison(
    record: VendorSuburbComparison,
    query: &MarketQuery,
) -> Result<SuburbComparison, NormalizationError> {
    const RECORD: &str = "suburb comparison";
    let suburb_median = positive(
        required(record.suburb_median, RECORD, "suburbMedian")?,
        RECORD,
        "suburbMedian",
    )?;
    let city_median = positive(
        required(record.city_median, RECORD, "cityMedian")?,
        RECORD,
        "cityMedian",
    )?;

    Ok(SuburbComparison {
        suburb: query.suburb.clone(),
        city: query.city.clone(),
        suburb_median,
        city_median,
        difference_pct: percent_change(city_median, suburb_median),
        neighbours: record
            .neighbours
            .into_iter()
            .filter_map(|neighbour| {
                Some(NeighbourMedian {
                    suburb: neighbour.suburb?,
                    median_price: neighbour.median_price?,
                })
            })
            .collect(),
    })
}

pub fn trend_analysis(
    record: VendorTrendReport,
    query: &MarketQuery,
) -> Result<TrendAnalysis, NormalizationError> {
    const RECORD: &str = "trend analysis";
    let points = monthly_points(record.months);
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(NormalizationError::MissingField {
            record: RECORD,
            field: "months",
        });
    };
    if points.len() < 2 {
        return Err(NormalizationError::InvalidValue {
            record: RECORD,
            field: "months",
            detail: String::from("at least two months are needed for a trend"),
        });
    }

    let start_median = first.median_price;
    let end_median = last.median_price;
    let change_pct = record
        .change_percent
        .map(round2)
        .unwrap_or_else(|| percent_change(start_median, end_median));

    Ok(TrendAnalysis {
        suburb: query.suburb.clone(),
        city: query.city.clone(),
        period_months: query.period_months,
        start_median,
        end_median,
        change_pct,
        direction: TrendDirection::from_change_pct(change_pct),
        points,
    })
}
