use std::time::Duration;

use time::OffsetDateTime;

use crate::data_source::{
    MarketDataSource, PropertyDataSource, SourceError, SourceFuture, VendorAddress,
    VendorAddressMatch, VendorAttributes, VendorAvmRecord, VendorMarketSeries,
    VendorMarketSnapshot, VendorMarketStatistics, VendorMonth, VendorNeighbour,
    VendorPropertyRecord, VendorSale, VendorSalesRecord, VendorSuburbComparison,
    VendorTrendReport,
};
use crate::rollout::rolling_hash;
use crate::{MarketQuery, PropertyQuery, ProviderKind};

const PROPERTY_TYPES: [&str; 4] = ["House", "Townhouse", "Apartment", "Unit"];
const NEIGHBOURS: [&str; 8] = [
    "Grey Lynn",
    "Herne Bay",
    "Freemans Bay",
    "Westmere",
    "Kingsland",
    "Mount Eden",
    "Parnell",
    "Ponsonby",
];

/// Artificial response delay: `base` plus up to `jitter` chosen at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockLatency {
    pub base: Duration,
    pub jitter: Duration,
}

impl MockLatency {
    pub const fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub const fn realistic() -> Self {
        Self {
            base: Duration::from_millis(150),
            jitter: Duration::from_millis(100),
        }
    }

    async fn wait(self) {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let delay = self.base + Duration::from_millis(fastrand::u64(0..=jitter_ms));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn seed(input: &str) -> u32 {
    rolling_hash(&input.to_lowercase()).unsigned_abs()
}

fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// `YYYY-MM` labels for the `count` months ending with the current one, oldest first.
fn month_labels(count: u16) -> Vec<String> {
    let today = OffsetDateTime::now_utc().date();
    let current = today.year() * 12 + i32::from(u8::from(today.month())) - 1;
    (0..i32::from(count))
        .rev()
        .map(|back| {
            let index = current - back;
            format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
        })
        .collect()
}

/// Deterministic property data with no I/O.
///
/// Every value is a function of the input alone; earlier calls never change
/// what a later call returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPropertyClient {
    latency: MockLatency,
}

impl MockPropertyClient {
    pub fn new(latency: MockLatency) -> Self {
        Self { latency }
    }

    pub fn property_id_for(address: &str) -> String {
        format!("CL-{:09}", seed(address) % 1_000_000_000)
    }

    fn base_value(property_id: &str) -> f64 {
        round_to(650_000.0 + f64::from(seed(property_id) % 1_200_000), 1_000.0)
    }

    fn address_for(property_id: &str) -> String {
        let seed = seed(property_id);
        let street = NEIGHBOURS[(seed as usize / 7) % NEIGHBOURS.len()];
        format!("{} {street} Road", seed % 200 + 1)
    }
}

fn require_id(property_id: &str) -> Result<&str, SourceError> {
    let property_id = property_id.trim();
    if property_id.is_empty() {
        return Err(SourceError::invalid_request("mock request requires a property id"));
    }
    Ok(property_id)
}

impl PropertyDataSource for MockPropertyClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn match_address<'a>(
        &'a self,
        query: &'a PropertyQuery,
    ) -> SourceFuture<'a, VendorAddressMatch> {
        Box::pin(async move {
            self.latency.wait().await;
            let address = query.address.as_deref().ok_or_else(|| {
                SourceError::invalid_request("mock address match requires an address")
            })?;

            Ok(VendorAddressMatch {
                property_id: Some(Self::property_id_for(address)),
                matched_address: Some(address.to_owned()),
                confidence: Some(0.9 + f64::from(seed(address) % 10) / 100.0),
            })
        })
    }

    fn property_attributes<'a>(
        &'a self,
        property_id: &'a str,
    ) -> SourceFuture<'a, VendorPropertyRecord> {
        Box::pin(async move {
            self.latency.wait().await;
            let property_id = require_id(property_id)?;
            let seed = seed(property_id);
            let property_type = PROPERTY_TYPES[(seed % 4) as usize];
            let is_apartment = property_type == "Apartment";

            Ok(VendorPropertyRecord {
                property_id: Some(property_id.to_owned()),
                address: Some(VendorAddress {
                    full_address: Some(Self::address_for(property_id)),
                    suburb: None,
                    city: None,
                    postcode: Some(format!("{:04}", 1000 + seed % 1100)),
                }),
                attributes: Some(VendorAttributes {
                    property_type: Some(property_type.to_owned()),
                    bedrooms: Some(1 + (seed % 5) as u8),
                    bathrooms: Some(1 + (seed % 3) as u8),
                    car_spaces: Some((seed % 3) as u8),
                    land_area: (!is_apartment).then(|| f64::from(300 + seed % 700)),
                    floor_area: Some(f64::from(70 + seed % 230)),
                    year_built: Some(1910 + (seed % 110) as u16),
                }),
            })
        })
    }

    fn sales_history<'a>(
        &'a self,
        property_id: &'a str,
    ) -> SourceFuture<'a, VendorSalesRecord> {
        Box::pin(async move {
            self.latency.wait().await;
            let property_id = require_id(property_id)?;
            let seed = seed(property_id);
            let base = Self::base_value(property_id);
            let count = 1 + seed % 4;

            let sales = (0..count)
                .map(|index| {
                    let year = 2023 - index * 4 - seed % 2;
                    let month = 1 + (seed >> index) % 12;
                    let day = 1 + (seed >> (index + 3)) % 28;
                    let method = if index % 2 == 0 { "auction" } else { "private treaty" };
                    VendorSale {
                        contract_date: Some(format!("{year:04}-{month:02}-{day:02}")),
                        price: Some(round_to(base * (1.0 - 0.12 * f64::from(index + 1)), 500.0)),
                        sale_method: Some(method.to_owned()),
                    }
                })
                .collect();

            Ok(VendorSalesRecord {
                property_id: Some(property_id.to_owned()),
                sales,
            })
        })
    }

    fn avm<'a>(&'a self, property_id: &'a str) -> SourceFuture<'a, VendorAvmRecord> {
        Box::pin(async move {
            self.latency.wait().await;
            let property_id = require_id(property_id)?;
            let estimate = round_to(Self::base_value(property_id) * 1.04, 1_000.0);

            Ok(VendorAvmRecord {
                property_id: Some(property_id.to_owned()),
                estimate: Some(estimate),
                low_estimate: Some(round_to(estimate * 0.9, 1_000.0)),
                high_estimate: Some(round_to(estimate * 1.1, 1_000.0)),
                confidence_score: Some(0.55 + f64::from(seed(property_id) % 40) / 100.0),
                valuation_date: None,
            })
        })
    }
}

/// Deterministic market data with no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockMarketClient {
    latency: MockLatency,
}

impl MockMarketClient {
    pub fn new(latency: MockLatency) -> Self {
        Self { latency }
    }

    fn median(query: &MarketQuery) -> f64 {
        let seed = seed(&query.cache_key());
        let bedroom_factor = query
            .bedrooms
            .map_or(1.0, |bedrooms| 0.7 + 0.1 * f64::from(bedrooms.min(6)));
        round_to((600_000.0 + f64::from(seed % 900_000)) * bedroom_factor, 1_000.0)
    }

    /// Monthly series ending at the current median.
    fn series(query: &MarketQuery) -> Vec<VendorMonth> {
        let seed = seed(&query.cache_key());
        let median = Self::median(query);
        let monthly_growth = (f64::from(seed % 13) - 5.0) / 1_000.0;
        let labels = month_labels(query.period_months);
        let last = labels.len().saturating_sub(1);

        labels
            .into_iter()
            .enumerate()
            .map(|(index, month)| {
                let months_back = (last - index) as i32;
                VendorMonth {
                    month: Some(month),
                    median_price: Some(round_to(
                        median / (1.0 + monthly_growth).powi(months_back),
                        1_000.0,
                    )),
                    sales_volume: Some(10 + (seed.rotate_right(index as u32)) % 25),
                }
            })
            .collect()
    }
}

impl MarketDataSource for MockMarketClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn market_statistics<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketStatistics> {
        Box::pin(async move {
            self.latency.wait().await;
            let seed = seed(&query.cache_key());
            let series = Self::series(query);
            let first = series.first().and_then(|month| month.median_price);
            let last = series.last().and_then(|month| month.median_price);
            let sales: u32 = series.iter().filter_map(|month| month.sales_volume).sum();

            Ok(VendorMarketStatistics {
                median_price: Some(Self::median(query)),
                mean_price: Some(round_to(Self::median(query) * 1.06, 1_000.0)),
                sales_volume: Some(sales),
                median_days_to_sell: Some(18 + seed % 60),
                price_change_percent: match (first, last) {
                    (Some(first), Some(last)) if first > 0.0 => {
                        Some((last - first) / first * 100.0)
                    }
                    _ => None,
                },
            })
        })
    }

    fn historical_market_data<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketSeries> {
        Box::pin(async move {
            self.latency.wait().await;
            Ok(VendorMarketSeries {
                months: Self::series(query),
            })
        })
    }

    fn market_snapshot<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorMarketSnapshot> {
        Box::pin(async move {
            self.latency.wait().await;
            let seed = seed(&query.cache_key());
            Ok(VendorMarketSnapshot {
                median_price: Some(Self::median(query)),
                active_listings: Some(20 + seed % 80),
                median_days_to_sell: Some(18 + seed % 60),
                clearance_rate: Some(0.3 + f64::from(seed % 50) / 100.0),
            })
        })
    }

    fn suburb_comparison<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorSuburbComparison> {
        Box::pin(async move {
            self.latency.wait().await;
            let base_seed = seed(&query.cache_key());
            let median = Self::median(query);
            let own = query.suburb.to_lowercase();

            let neighbours = NEIGHBOURS
                .iter()
                .filter(|name| name.to_lowercase() != own)
                .cycle()
                .skip((base_seed % 8) as usize)
                .take(3)
                .map(|name| VendorNeighbour {
                    suburb: Some((*name).to_owned()),
                    median_price: Some(round_to(
                        median * (0.85 + f64::from(seed(name) % 30) / 100.0),
                        1_000.0,
                    )),
                })
                .collect();

            Ok(VendorSuburbComparison {
                suburb_median: Some(median),
                city_median: Some(round_to(
                    median * (0.8 + f64::from(base_seed % 40) / 100.0),
                    1_000.0,
                )),
                neighbours,
            })
        })
    }

    fn trend_analysis<'a>(
        &'a self,
        query: &'a MarketQuery,
    ) -> SourceFuture<'a, VendorTrendReport> {
        Box::pin(async move {
            self.latency.wait().await;
            Ok(VendorTrendReport {
                months: Self::series(query),
                change_percent: None,
            })
        })
    }
}
