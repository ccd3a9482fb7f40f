use propdata_core::GatewaySettings;
use propdata_store::Store;
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::cli::CacheShowArgs;
use crate::error::CliError;

use super::CommandOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheRowView {
    cache_key: String,
    created_at: String,
    age_secs: i64,
    ttl_secs: u64,
    fresh: bool,
    data: Value,
}

pub fn show(
    args: &CacheShowArgs,
    store: &Store,
    settings: &GatewaySettings,
) -> Result<CommandOutput, CliError> {
    let Some(row) = store.get_cache_row(&args.key)? else {
        return Err(CliError::Command(format!("no cache entry for '{}'", args.key)));
    };

    let now = OffsetDateTime::now_utc();
    let age = now - row.created_at;
    let ttl = settings.cache_ttl;
    let view = CacheRowView {
        cache_key: row.cache_key,
        created_at: row
            .created_at
            .format(&Rfc3339)
            .map_err(|error| CliError::Command(error.to_string()))?,
        age_secs: age.whole_seconds(),
        ttl_secs: ttl.as_secs(),
        fresh: !ttl.is_zero() && std::time::Duration::try_from(age).map_or(true, |age| age < ttl),
        data: row.data,
    };

    Ok(CommandOutput::ok(serde_json::to_value(view)?))
}
