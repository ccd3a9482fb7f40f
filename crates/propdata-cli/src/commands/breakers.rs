use propdata_core::{CacheMode, Gateways, MarketDataRequest};
use serde_json::json;

use crate::cli::BreakersArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &BreakersArgs, gateways: &Gateways) -> Result<CommandOutput, CliError> {
    let probe = if args.probe {
        let request = MarketDataRequest::new(args.suburb.clone(), args.city.clone());
        let envelope = gateways.market.fetch(&request, CacheMode::Bypass).await;
        Some(json!({ "success": envelope.success, "error": envelope.error }))
    } else {
        None
    };

    let metrics = gateways.registry().metrics_all();
    Ok(CommandOutput::ok(json!({
        "probe": probe,
        "circuits": metrics,
    })))
}
