use propdata_core::{CacheMode, Gateways, PropertyDataRequest};

use crate::cli::PropertyArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(
    args: &PropertyArgs,
    gateways: &Gateways,
    mode: CacheMode,
) -> Result<CommandOutput, CliError> {
    let mut request = PropertyDataRequest {
        property_id: args.property_id.clone(),
        address: args.address.clone(),
        suburb: args.suburb.clone(),
        city: args.city.clone(),
        postcode: args.postcode.clone(),
        required_facets: Vec::new(),
    };
    for facet in &args.required {
        request = request.requiring(*facet);
    }

    let envelope = gateways.property.fetch(&request, mode).await;
    CommandOutput::from_envelope(&envelope)
}
