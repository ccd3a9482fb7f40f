use propdata_core::{CacheMode, Gateways, MarketDataRequest};

use crate::cli::MarketArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(
    args: &MarketArgs,
    gateways: &Gateways,
    mode: CacheMode,
) -> Result<CommandOutput, CliError> {
    let mut request = MarketDataRequest::new(args.suburb.clone(), args.city.clone());
    if let Some(property_type) = &args.property_type {
        request = request.with_property_type(property_type.clone());
    }
    if let Some(bedrooms) = args.bedrooms {
        request = request.with_bedrooms(bedrooms);
    }
    if let Some(period) = args.period {
        request = request.with_period(period);
    }
    for facet in &args.required {
        request = request.requiring(*facet);
    }

    let envelope = gateways.market.fetch(&request, mode).await;
    CommandOutput::from_envelope(&envelope)
}
