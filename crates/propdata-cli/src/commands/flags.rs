use propdata_core::RolloutFlag;
use propdata_store::{FeatureFlagRow, Store};
use serde_json::json;

use crate::cli::{FlagGetArgs, FlagSetArgs};
use crate::error::CliError;

use super::CommandOutput;

pub fn get(args: &FlagGetArgs, store: &Store) -> Result<CommandOutput, CliError> {
    let Some(row) = store.get_feature_flag(&args.id)? else {
        return Err(CliError::Command(format!("no rollout flag named '{}'", args.id)));
    };
    Ok(CommandOutput::ok(serde_json::to_value(row)?))
}

pub fn set(args: &FlagSetArgs, store: &Store) -> Result<CommandOutput, CliError> {
    let id = args.id.trim();
    if id.is_empty() {
        return Err(CliError::Command(String::from("flag id must not be empty")));
    }

    let flag = RolloutFlag::new(args.enabled, args.percentage)?;
    let row = FeatureFlagRow {
        id: id.to_owned(),
        enabled: flag.enabled,
        percentage: flag.percentage,
    };
    store.upsert_feature_flag(&row)?;
    tracing::info!(
        flag = id,
        enabled = flag.enabled,
        percentage = flag.percentage,
        "rollout flag updated"
    );

    Ok(CommandOutput::ok(json!({ "updated": row })))
}
