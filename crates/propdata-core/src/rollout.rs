//! Deterministic percentage rollout between mock and real vendors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use propdata_store::{FeatureFlagRow, Store};
use serde::{Deserialize, Serialize};

use crate::{CoreError, ProviderKind, ValidationError};

/// Flag gating real CoreLogic property calls.
pub const PROPERTY_DATA_FLAG: &str = "corelogic_property_data";
/// Flag gating real REINZ market calls.
pub const MARKET_DATA_FLAG: &str = "reinz_market_data";

/// `hash = hash * 31 + unit` over UTF-16 code units, wrapping at 32 bits.
pub fn rolling_hash(key: &str) -> i32 {
    key.encode_utf16().fold(0_i32, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

/// Rollout bucket in `0..100` for a hash value.
pub fn bucket_for_hash(hash: i32) -> u8 {
    // i64 so that |i32::MIN| is representable.
    (i64::from(hash).abs() % 100) as u8
}

pub fn rollout_bucket(key: &str) -> u8 {
    bucket_for_hash(rolling_hash(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutFlag {
    pub enabled: bool,
    pub percentage: u8,
}

impl RolloutFlag {
    pub fn new(enabled: bool, percentage: i64) -> Result<Self, ValidationError> {
        if !(0..=100).contains(&percentage) {
            return Err(ValidationError::InvalidPercentage { value: percentage });
        }
        Ok(Self {
            enabled,
            percentage: percentage as u8,
        })
    }

    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            percentage: 0,
        }
    }

    pub const fn full() -> Self {
        Self {
            enabled: true,
            percentage: 100,
        }
    }

    /// Whether `key` falls inside this flag's rollout.
    ///
    /// Buckets are not stable across percentage changes: a key in the rollout at
    /// 30% is not guaranteed to stay in it at 40%.
    pub fn includes(&self, key: &str) -> bool {
        self.enabled && (self.percentage >= 100 || rollout_bucket(key) < self.percentage)
    }
}

impl Default for RolloutFlag {
    fn default() -> Self {
        Self::disabled()
    }
}

impl From<FeatureFlagRow> for RolloutFlag {
    fn from(row: FeatureFlagRow) -> Self {
        Self {
            enabled: row.enabled,
            percentage: row.percentage.min(100),
        }
    }
}

pub fn select_provider(key: &str, flag: RolloutFlag, force_mock: bool) -> ProviderKind {
    if !force_mock && flag.includes(key) {
        ProviderKind::Real
    } else {
        ProviderKind::Mock
    }
}

/// Read-only access to rollout flags.
pub trait RolloutFlagSource: Send + Sync {
    fn flag<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RolloutFlag>, CoreError>> + Send + 'a>>;
}

/// Resolves a flag, treating a missing flag or a lookup failure as disabled.
pub async fn resolve_flag(source: &dyn RolloutFlagSource, id: &str) -> RolloutFlag {
    match source.flag(id).await {
        Ok(Some(flag)) => flag,
        Ok(None) => {
            tracing::debug!(flag = id, "rollout flag not found, using mock");
            RolloutFlag::disabled()
        }
        Err(error) => {
            tracing::warn!(flag = id, %error, "rollout flag lookup failed, using mock");
            RolloutFlag::disabled()
        }
    }
}

/// Fixed flags, for tests and for running without a store.
#[derive(Debug, Clone, Default)]
pub struct StaticFlagSource {
    flags: HashMap<String, RolloutFlag>,
}

impl StaticFlagSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, id: impl Into<String>, flag: RolloutFlag) -> Self {
        self.flags.insert(id.into(), flag);
        self
    }
}

impl RolloutFlagSource for StaticFlagSource {
    fn flag<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RolloutFlag>, CoreError>> + Send + 'a>> {
        let flag = self.flags.get(id).copied();
        Box::pin(async move { Ok(flag) })
    }
}

/// Flags read from the `feature_flags` table.
#[derive(Clone)]
pub struct StoreFlagSource {
    store: Store,
}

impl StoreFlagSource {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl RolloutFlagSource for StoreFlagSource {
    fn flag<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RolloutFlag>, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let store = self.store.clone();
            let id = id.to_owned();
            let row = tokio::task::spawn_blocking(move || store.get_feature_flag(&id))
                .await
                .map_err(|error| CoreError::Task(error.to_string()))??;
            Ok(row.map(RolloutFlag::from))
        })
    }
}
