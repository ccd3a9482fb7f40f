use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Cache-key sentinel for optional parameters the caller left out.
pub const ALL_SENTINEL: &str = "all";

/// Months of market history used when the caller does not ask for a period.
pub const DEFAULT_PERIOD_MONTHS: u16 = 12;

const MAX_PERIOD_MONTHS: i64 = 120;
const MAX_BEDROOMS: i64 = 20;

/// Data facets served by the market gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketFacet {
    Statistics,
    Snapshot,
    Comparison,
    Trends,
    History,
}

impl MarketFacet {
    pub const ALL: [Self; 5] = [
        Self::Statistics,
        Self::Snapshot,
        Self::Comparison,
        Self::Trends,
        Self::History,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Statistics => "statistics",
            Self::Snapshot => "snapshot",
            Self::Comparison => "comparison",
            Self::Trends => "trends",
            Self::History => "history",
        }
    }

    /// Name of the circuit breaker guarding this facet.
    pub const fn circuit(self) -> &'static str {
        match self {
            Self::Statistics => "market-statistics",
            Self::Snapshot => "market-snapshot",
            Self::Comparison => "suburb-comparison",
            Self::Trends => "trend-analysis",
            Self::History => "historical-market-data",
        }
    }
}

impl Display for MarketFacet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketFacet {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|facet| facet.as_str() == normalized)
            .ok_or(ValidationError::UnknownFacet { value: normalized })
    }
}

/// Data facets served by the property gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyFacet {
    Match,
    Attributes,
    Sales,
    Avm,
}

impl PropertyFacet {
    pub const ALL: [Self; 4] = [Self::Match, Self::Attributes, Self::Sales, Self::Avm];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Attributes => "attributes",
            Self::Sales => "sales",
            Self::Avm => "avm",
        }
    }

    pub const fn circuit(self) -> &'static str {
        match self {
            Self::Match => "address-match",
            Self::Attributes => "property-attributes",
            Self::Sales => "sales-history",
            Self::Avm => "avm",
        }
    }
}

impl Display for PropertyFacet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyFacet {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|facet| facet.as_str() == normalized)
            .ok_or(ValidationError::UnknownFacet { value: normalized })
    }
}

/// Inbound market data request as received from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataRequest {
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<i64>,
    /// Months of history.
    #[serde(default)]
    pub period: Option<i64>,
    /// Facets whose absence fails the whole response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_facets: Vec<MarketFacet>,
}

impl MarketDataRequest {
    pub fn new(suburb: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            suburb: Some(suburb.into()),
            city: Some(city.into()),
            ..Self::default()
        }
    }

    pub fn with_property_type(mut self, property_type: impl Into<String>) -> Self {
        self.property_type = Some(property_type.into());
        self
    }

    pub fn with_bedrooms(mut self, bedrooms: i64) -> Self {
        self.bedrooms = Some(bedrooms);
        self
    }

    pub fn with_period(mut self, months: i64) -> Self {
        self.period = Some(months);
        self
    }

    pub fn requiring(mut self, facet: MarketFacet) -> Self {
        if !self.required_facets.contains(&facet) {
            self.required_facets.push(facet);
        }
        self
    }

    /// Validates and defaults the request.
    pub fn normalize(&self) -> Result<MarketQuery, ValidationError> {
        let suburb = non_blank(self.suburb.as_deref());
        let city = non_blank(self.city.as_deref());

        let mut missing = Vec::new();
        if suburb.is_none() {
            missing.push("suburb");
        }
        if city.is_none() {
            missing.push("city");
        }
        let (Some(suburb), Some(city)) = (suburb, city) else {
            return Err(ValidationError::MissingParameters { fields: missing });
        };

        let bedrooms = match self.bedrooms {
            Some(value) if !(0..=MAX_BEDROOMS).contains(&value) => {
                return Err(ValidationError::InvalidBedrooms {
                    value,
                    max: MAX_BEDROOMS,
                })
            }
            Some(value) => Some(value as u8),
            None => None,
        };

        let period_months = match self.period {
            Some(value) if !(1..=MAX_PERIOD_MONTHS).contains(&value) => {
                return Err(ValidationError::InvalidPeriod {
                    value,
                    max: MAX_PERIOD_MONTHS,
                })
            }
            Some(value) => value as u16,
            None => DEFAULT_PERIOD_MONTHS,
        };

        let mut required = vec![MarketFacet::Statistics];
        for facet in &self.required_facets {
            if !required.contains(facet) {
                required.push(*facet);
            }
        }

        Ok(MarketQuery {
            suburb,
            city,
            property_type: non_blank(self.property_type.as_deref()),
            bedrooms,
            period_months,
            required,
        })
    }
}

/// Validated, defaulted market request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketQuery {
    pub suburb: String,
    pub city: String,
    pub property_type: Option<String>,
    pub bedrooms: Option<u8>,
    pub period_months: u16,
    #[serde(skip)]
    pub required: Vec<MarketFacet>,
}

impl MarketQuery {
    /// `suburb-city-propertyType-bedrooms-period`, lower-cased.
    pub fn cache_key(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.suburb,
            self.city,
            self.property_type.as_deref().unwrap_or(ALL_SENTINEL),
            self.bedrooms
                .map(|value| value.to_string())
                .unwrap_or_else(|| String::from(ALL_SENTINEL)),
            self.period_months
        )
        .to_lowercase()
    }

    /// Stable key used for rollout bucketing.
    pub fn rollout_key(&self) -> String {
        format!("{}{}", self.suburb, self.city).to_lowercase()
    }

    pub fn is_required(&self, facet: MarketFacet) -> bool {
        self.required.contains(&facet)
    }
}

/// Inbound property data request as received from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDataRequest {
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_facets: Vec<PropertyFacet>,
}

impl PropertyDataRequest {
    pub fn by_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn by_property_id(property_id: impl Into<String>) -> Self {
        Self {
            property_id: Some(property_id.into()),
            ..Self::default()
        }
    }

    pub fn with_locality(
        mut self,
        suburb: impl Into<String>,
        city: impl Into<String>,
        postcode: Option<String>,
    ) -> Self {
        self.suburb = Some(suburb.into());
        self.city = Some(city.into());
        self.postcode = postcode;
        self
    }

    pub fn requiring(mut self, facet: PropertyFacet) -> Self {
        if !self.required_facets.contains(&facet) {
            self.required_facets.push(facet);
        }
        self
    }

    pub fn normalize(&self) -> Result<PropertyQuery, ValidationError> {
        let property_id = non_blank(self.property_id.as_deref());
        let address = non_blank(self.address.as_deref());

        if property_id.is_none() && address.is_none() {
            return Err(ValidationError::MissingParameters {
                fields: vec!["address or propertyId"],
            });
        }

        let mut required = vec![PropertyFacet::Attributes];
        if property_id.is_none() {
            required.push(PropertyFacet::Match);
        }
        for facet in &self.required_facets {
            if !required.contains(facet) {
                required.push(*facet);
            }
        }

        Ok(PropertyQuery {
            property_id,
            address,
            suburb: non_blank(self.suburb.as_deref()),
            city: non_blank(self.city.as_deref()),
            postcode: non_blank(self.postcode.as_deref()),
            required,
        })
    }
}

/// Validated property request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyQuery {
    pub property_id: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    #[serde(skip)]
    pub required: Vec<PropertyFacet>,
}

impl PropertyQuery {
    pub fn cache_key(&self) -> String {
        match &self.property_id {
            Some(property_id) => format!("property-{property_id}").to_lowercase(),
            None => format!(
                "address-{}-{}-{}-{}",
                self.address.as_deref().unwrap_or(ALL_SENTINEL),
                self.suburb.as_deref().unwrap_or(ALL_SENTINEL),
                self.city.as_deref().unwrap_or(ALL_SENTINEL),
                self.postcode.as_deref().unwrap_or(ALL_SENTINEL),
            )
            .to_lowercase(),
        }
    }

    pub fn rollout_key(&self) -> String {
        self.property_id
            .as_deref()
            .or(self.address.as_deref())
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn is_required(&self, facet: PropertyFacet) -> bool {
        self.required.contains(&facet)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
