mod breakers;
mod cache;
mod flags;
mod market;
mod property;

use std::sync::Arc;

use propdata_core::{
    GatewayBuilder, GatewayResponse, GatewaySettings, Gateways, ResponseCache, StoreCacheBackend,
    StoreFlagSource,
};
use propdata_store::{Store, StoreConfig};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{CacheCommand, Cli, Command, FlagsCommand};
use crate::error::CliError;

/// Rendered command result; a failed gateway envelope is still printed.
pub struct CommandOutput {
    pub value: Value,
    pub failure: Option<String>,
}

impl CommandOutput {
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            failure: None,
        }
    }

    pub fn from_envelope<T: Serialize>(envelope: &GatewayResponse<T>) -> Result<Self, CliError> {
        Ok(Self {
            value: serde_json::to_value(envelope)?,
            failure: if envelope.success {
                None
            } else {
                Some(envelope.error.clone().unwrap_or_default())
            },
        })
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let store = open_store(cli)?;

    match &cli.command {
        Command::Market(args) => {
            market::run(args, &gateways(cli, &store)?, cli.cache_mode()).await
        }
        Command::Property(args) => {
            property::run(args, &gateways(cli, &store)?, cli.cache_mode()).await
        }
        Command::Flags(args) => match &args.command {
            FlagsCommand::Get(get) => flags::get(get, &store),
            FlagsCommand::Set(set) => flags::set(set, &store),
        },
        Command::Cache(args) => match &args.command {
            CacheCommand::Show(show) => cache::show(show, &store, &settings(cli)?),
        },
        Command::Breakers(args) => breakers::run(args, &gateways(cli, &store)?).await,
    }
}

fn open_store(cli: &Cli) -> Result<Store, CliError> {
    let config = if cli.no_persist {
        StoreConfig::in_memory()
    } else if let Some(path) = &cli.db {
        StoreConfig::with_db_path(path)
    } else {
        StoreConfig::default()
    };
    let store = Store::open(config)?;
    tracing::debug!(db = ?store.db_path(), "store opened");
    Ok(store)
}

fn settings(cli: &Cli) -> Result<GatewaySettings, CliError> {
    let settings = GatewaySettings::from_env()?;
    Ok(if cli.mock {
        settings.with_force_mock(true)
    } else {
        settings
    })
}

fn gateways(cli: &Cli, store: &Store) -> Result<Gateways, CliError> {
    let settings = settings(cli)?;
    let cache = ResponseCache::new(
        Arc::new(StoreCacheBackend::new(store.clone())),
        settings.cache_ttl,
    );

    Ok(GatewayBuilder::new(settings)
        .with_cache(cache)
        .with_flag_source(Arc::new(StoreFlagSource::new(store.clone())))
        .build())
}
