//! CLI argument definitions for propdata.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `market` | Suburb market report through the market gateway |
//! | `property` | Property report through the property gateway |
//! | `flags` | Read or write rollout flags in the store |
//! | `cache` | Inspect stored gateway responses |
//! | `breakers` | Print circuit breaker metrics |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--mock` | `false` | Never call real vendors |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--db` | `$PROPDATA_HOME/store.duckdb` | Store database file |
//! | `--no-persist` | `false` | Use a throwaway in-memory store |
//! | `--no-cache` | `false` | Neither read nor write the response cache |
//! | `--refresh` | `false` | Skip cache reads, still write the result |
//! | `--log-level` | `$PROPDATA_LOG` or `warn` | Tracing filter directive |
//!
//! # Examples
//!
//! ```bash
//! propdata --mock market --suburb Ponsonby --city Auckland --property-type house --pretty
//! propdata property --address "12 Ponsonby Road" --suburb Ponsonby --city Auckland
//! propdata flags set reinz_market_data --enabled --percentage 25
//! propdata cache show ponsonby-auckland-house-all-12
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use propdata_core::{CacheMode, MarketFacet, PropertyFacet};

/// Resilient property and market data gateway.
#[derive(Debug, Parser)]
#[command(
    name = "propdata",
    author,
    version,
    about = "Resilient property and market data gateway",
    long_about = "propdata looks up property and suburb market data from CoreLogic and REINZ, \
with deterministic mock fallbacks, circuit breakers, a percentage rollout per vendor and a \
DuckDB-backed response cache.\n\
\n\
Vendor credentials are read from PROPDATA_* environment variables. Vendors without \
credentials are always served by the mock client."
)]
pub struct Cli {
    /// Serve every request from the mock clients.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Store database file.
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Use a throwaway in-memory store.
    #[arg(long, global = true, default_value_t = false, conflicts_with = "db")]
    pub no_persist: bool,

    /// Neither read nor write the response cache.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    /// Skip cache reads but store the fresh response.
    #[arg(long, global = true, default_value_t = false, conflicts_with = "no_cache")]
    pub refresh: bool,

    /// Tracing filter, e.g. `info` or `propdata_core=debug`.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn cache_mode(&self) -> CacheMode {
        if self.no_cache {
            CacheMode::Bypass
        } else if self.refresh {
            CacheMode::Refresh
        } else {
            CacheMode::Use
        }
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a suburb market report.
    ///
    /// # Examples
    ///
    ///   propdata market --suburb Ponsonby --city Auckland
    ///   propdata market --suburb "Grey Lynn" --city Auckland --bedrooms 3 --require trends
    Market(MarketArgs),

    /// Fetch a property report by address or vendor property id.
    ///
    /// # Examples
    ///
    ///   propdata property --address "12 Ponsonby Road" --suburb Ponsonby --city Auckland
    ///   propdata property --property-id CL-000123456 --require avm
    Property(PropertyArgs),

    /// Rollout flag commands.
    Flags(FlagsArgs),

    /// Response cache commands.
    Cache(CacheArgs),

    /// Print circuit breaker metrics.
    Breakers(BreakersArgs),
}

/// Arguments for the `market` command.
#[derive(Debug, Args)]
pub struct MarketArgs {
    #[arg(long)]
    pub suburb: String,

    #[arg(long)]
    pub city: String,

    /// Property type filter, e.g. house, apartment, townhouse.
    #[arg(long)]
    pub property_type: Option<String>,

    #[arg(long)]
    pub bedrooms: Option<i64>,

    /// Lookback period in months (default: 12).
    #[arg(long)]
    pub period: Option<i64>,

    /// Facets that must succeed: statistics, snapshot, comparison, trends, history.
    #[arg(long = "require", value_name = "FACET")]
    pub required: Vec<MarketFacet>,
}

/// Arguments for the `property` command.
#[derive(Debug, Args)]
pub struct PropertyArgs {
    #[arg(long)]
    pub address: Option<String>,

    #[arg(long)]
    pub property_id: Option<String>,

    #[arg(long)]
    pub suburb: Option<String>,

    #[arg(long)]
    pub city: Option<String>,

    #[arg(long)]
    pub postcode: Option<String>,

    /// Facets that must succeed: match, attributes, sales, avm.
    #[arg(long = "require", value_name = "FACET")]
    pub required: Vec<PropertyFacet>,
}

/// Arguments for the `flags` command group.
#[derive(Debug, Args)]
pub struct FlagsArgs {
    #[command(subcommand)]
    pub command: FlagsCommand,
}

#[derive(Debug, Subcommand)]
pub enum FlagsCommand {
    /// Print a rollout flag.
    Get(FlagGetArgs),

    /// Create or overwrite a rollout flag.
    Set(FlagSetArgs),
}

#[derive(Debug, Args)]
pub struct FlagGetArgs {
    /// Flag id, e.g. `corelogic_property_data` or `reinz_market_data`.
    pub id: String,
}

#[derive(Debug, Args)]
pub struct FlagSetArgs {
    pub id: String,

    /// Allow real vendor traffic for this flag.
    #[arg(long, action = ArgAction::SetTrue)]
    pub enabled: bool,

    /// Share of request keys routed to the real vendor (0-100).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub percentage: i64,
}

/// Arguments for the `cache` command group.
#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Print a stored response and whether it is still fresh.
    Show(CacheShowArgs),
}

#[derive(Debug, Args)]
pub struct CacheShowArgs {
    /// Cache key, e.g. `ponsonby-auckland-house-all-12`.
    pub key: String,
}

/// Arguments for the `breakers` command.
#[derive(Debug, Args)]
pub struct BreakersArgs {
    /// Run one market lookup first so the vendor circuits have traffic.
    #[arg(long, default_value_t = false)]
    pub probe: bool,

    #[arg(long, default_value = "Ponsonby", requires = "probe")]
    pub suburb: String,

    #[arg(long, default_value = "Auckland", requires = "probe")]
    pub city: String,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn market_arguments_parse_facets() {
        let cli = Cli::try_parse_from([
            "propdata", "--mock", "market", "--suburb", "Ponsonby", "--city", "Auckland",
            "--require", "trends", "--require", "history",
        ])
        .expect("valid arguments");

        assert!(cli.mock);
        let Command::Market(args) = cli.command else {
            panic!("expected market command");
        };
        assert_eq!(args.required, vec![MarketFacet::Trends, MarketFacet::History]);
    }

    #[test]
    fn cache_flags_select_mode() {
        let cli = Cli::try_parse_from(["propdata", "--refresh", "breakers"]).expect("valid");
        assert_eq!(cli.cache_mode(), CacheMode::Refresh);

        let cli = Cli::try_parse_from(["propdata", "--no-cache", "breakers"]).expect("valid");
        assert_eq!(cli.cache_mode(), CacheMode::Bypass);

        assert!(Cli::try_parse_from(["propdata", "--no-cache", "--refresh", "breakers"]).is_err());
    }
}
