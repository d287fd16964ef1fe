//! Pool and deployment configuration
//!
//! [`DegenPoolParams`] and [`PositivePoolParams`] are what the owner passes
//! to create a pool. [`DeploymentConfig`] describes a whole deployment in
//! TOML and is applied with `PoolRegistry::from_config`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use posum_common::{
    locks, multipliers, rates, scale, Address, AssetKind, LockPolicy, PoolConfig, PoolKind,
    PosumError, ShareClass, ShareClassConfig, Timestamp,
};

/// Parameters of a Degen pool: one permanently locked class at 2x SUM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegenPoolParams {
    /// Pooled asset
    pub asset: AssetKind,
    /// Fixed-point scale of both rates
    pub scale: u128,
    /// Yield per share unit per second, at `scale`
    pub yield_rate_per_second_per_share: u128,
    /// SUM points per share unit per second, at `scale`
    pub points_rate_per_second: u128,
    /// Reward reserve funder
    pub treasury: Address,
}

impl DegenPoolParams {
    /// Expand into a full pool config
    pub fn into_config(self) -> PoolConfig {
        PoolConfig {
            kind: PoolKind::Degen,
            asset: self.asset,
            classes: vec![ShareClassConfig {
                class: ShareClass::Single,
                multiplier_bps: multipliers::DEGEN_BPS,
                lock: LockPolicy::Permanent,
            }],
            scale: self.scale,
            yield_rate_per_second_per_share: self.yield_rate_per_second_per_share,
            points_rate_per_second: self.points_rate_per_second,
            treasury: self.treasury,
        }
    }
}

/// Parameters of a Positive pool: Flex at 1x and time-locked Locked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositivePoolParams {
    /// Pooled asset
    pub asset: AssetKind,
    /// Fixed-point scale of both rates
    pub scale: u128,
    /// Yield per share unit per second, at `scale`
    pub yield_rate_per_second_per_share: u128,
    /// SUM points per share unit per second, at `scale`
    pub points_rate_per_second: u128,
    /// Lock applied to every Locked deposit
    pub lock_duration_seconds: u64,
    /// SUM weight of the Locked class
    pub locked_multiplier_bps: u32,
    /// Reward reserve funder
    pub treasury: Address,
}

impl PositivePoolParams {
    /// Params at the asset's own scale with the default points rate, lock
    /// and Locked multiplier
    pub fn with_defaults(
        asset: AssetKind,
        yield_rate_per_second_per_share: u128,
        treasury: Address,
    ) -> Self {
        Self {
            asset,
            scale: asset.scale(),
            yield_rate_per_second_per_share,
            points_rate_per_second: rates::default_points_rate(asset.scale()),
            lock_duration_seconds: locks::DEFAULT_LOCK_SECONDS,
            locked_multiplier_bps: multipliers::LOCKED_BPS,
            treasury,
        }
    }

    /// Expand into a full pool config
    pub fn into_config(self) -> PoolConfig {
        PoolConfig {
            kind: PoolKind::Positive,
            asset: self.asset,
            classes: vec![
                ShareClassConfig {
                    class: ShareClass::Flex,
                    multiplier_bps: multipliers::FLEX_BPS,
                    lock: LockPolicy::Unlocked,
                },
                ShareClassConfig {
                    class: ShareClass::Locked,
                    multiplier_bps: self.locked_multiplier_bps,
                    lock: LockPolicy::Timed { duration_seconds: self.lock_duration_seconds },
                },
            ],
            scale: self.scale,
            yield_rate_per_second_per_share: self.yield_rate_per_second_per_share,
            points_rate_per_second: self.points_rate_per_second,
            treasury: self.treasury,
        }
    }
}

// ============ Deployment Config ============

/// Deployment configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Address field is not 64 hex characters
    #[error("invalid address `{0}`: expected 64 hex characters")]
    InvalidAddress(String),

    /// Registry rejected the configuration
    #[error(transparent)]
    Pool(#[from] PosumError),
}

/// One pool entry of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    /// `degen` or `positive`
    pub kind: PoolKind,
    /// Token address (hex); native coin when absent
    #[serde(default)]
    pub token: Option<String>,
    /// Asset decimals
    pub decimals: u8,
    /// Yield APR in basis points
    pub apr_bps: u32,
    /// Decimals of the accrual scale; the asset's decimals when absent.
    /// Raise it for low-decimal assets whose APR would round to zero.
    #[serde(default)]
    pub scale_decimals: Option<u8>,
    /// SUM points rate at the accrual scale; `rates::default_points_rate`
    /// when absent
    #[serde(default)]
    pub points_rate_per_second: Option<u64>,
    /// Locked-class lock (Positive only); `locks::DEFAULT_LOCK_SECONDS` when absent
    #[serde(default)]
    pub lock_seconds: Option<u64>,
    /// Locked-class multiplier (Positive only); `multipliers::LOCKED_BPS` when absent
    #[serde(default)]
    pub locked_multiplier_bps: Option<u32>,
    /// Treasury address (hex)
    pub treasury: String,
}

impl PoolEntry {
    /// Resolve into a pool config
    pub fn to_pool_config(&self) -> Result<PoolConfig, ConfigError> {
        let asset = match &self.token {
            Some(token) => {
                AssetKind::Token { token: parse_address(token)?, decimals: self.decimals }
            }
            None => AssetKind::Native { decimals: self.decimals },
        };
        let scale = self.accrual_scale()?;
        let yield_rate = rates::apr_bps_to_rate(self.apr_bps as u128, scale);
        if self.apr_bps > 0 && yield_rate == 0 {
            return Err(ConfigError::Pool(PosumError::InvalidPoolConfig {
                reason: "apr rounds to zero at this scale; raise scale_decimals",
            }));
        }
        let points_rate = self
            .points_rate_per_second
            .map(u128::from)
            .unwrap_or(rates::default_points_rate(scale));
        let treasury = parse_address(&self.treasury)?;
        let lock_duration_seconds = self.lock_seconds.unwrap_or(locks::DEFAULT_LOCK_SECONDS);
        let locked_multiplier_bps =
            self.locked_multiplier_bps.unwrap_or(multipliers::LOCKED_BPS);

        Ok(match self.kind {
            PoolKind::Degen => DegenPoolParams {
                asset,
                scale,
                yield_rate_per_second_per_share: yield_rate,
                points_rate_per_second: points_rate,
                treasury,
            }
            .into_config(),
            PoolKind::Positive => PositivePoolParams {
                asset,
                scale,
                yield_rate_per_second_per_share: yield_rate,
                points_rate_per_second: points_rate,
                lock_duration_seconds,
                locked_multiplier_bps,
                treasury,
            }
            .into_config(),
        })
    }

    fn accrual_scale(&self) -> Result<u128, ConfigError> {
        let decimals = self.scale_decimals.unwrap_or(self.decimals);
        if decimals > scale::MAX_DECIMALS {
            return Err(ConfigError::Pool(PosumError::InvalidPoolConfig {
                reason: "scale_decimals above the supported maximum",
            }));
        }
        Ok(10u128.pow(decimals as u32))
    }
}

/// Whole-deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Registry owner (hex)
    pub owner: String,
    /// Creation time of every configured pool
    #[serde(default)]
    pub start_time: Timestamp,
    /// Pools to create, in order
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
}

impl DeploymentConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Owner address
    pub fn owner_address(&self) -> Result<Address, ConfigError> {
        parse_address(&self.owner)
    }
}

/// Parse a 32-byte address written as 64 hex characters (optional `0x`)
pub fn parse_address(text: &str) -> Result<Address, ConfigError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() != 64 || !digits.is_ascii() {
        return Err(ConfigError::InvalidAddress(text.to_string()));
    }
    let mut address = [0u8; 32];
    for (i, byte) in address.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16)
            .map_err(|_| ConfigError::InvalidAddress(text.to_string()))?;
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
owner = "0101010101010101010101010101010101010101010101010101010101010101"
start_time = 1700000000

[[pools]]
kind = "degen"
decimals = 18
apr_bps = 500
treasury = "0x0909090909090909090909090909090909090909090909090909090909090909"

[[pools]]
kind = "positive"
token = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc"
decimals = 6
scale_decimals = 18
apr_bps = 1200
lock_seconds = 604800
treasury = "0909090909090909090909090909090909090909090909090909090909090909"
"#;

    #[test]
    fn test_parse_deployment() {
        let config = DeploymentConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.owner_address().unwrap(), [1u8; 32]);
        assert_eq!(config.start_time, 1_700_000_000);
        assert_eq!(config.pools.len(), 2);

        let degen = config.pools[0].to_pool_config().unwrap();
        assert_eq!(degen.kind, PoolKind::Degen);
        assert_eq!(degen.asset, AssetKind::Native { decimals: 18 });
        assert!(degen.validate().is_ok());

        let positive = config.pools[1].to_pool_config().unwrap();
        assert_eq!(positive.asset, AssetKind::Token { token: [0xcc; 32], decimals: 6 });
        assert_eq!(
            positive.class(ShareClass::Locked).unwrap().lock,
            LockPolicy::Timed { duration_seconds: 604_800 }
        );
        assert_eq!(positive.scale, scale::ACCRUAL_PRECISION);
        assert_eq!(
            positive.points_rate_per_second,
            rates::default_points_rate(scale::ACCRUAL_PRECISION)
        );
        assert_eq!(
            positive.yield_rate_per_second_per_share,
            rates::apr_bps_to_rate(1_200, scale::ACCRUAL_PRECISION)
        );
        assert_eq!(degen.scale, 10u128.pow(18));
    }

    #[test]
    fn test_apr_below_asset_scale_rejected() {
        let source = SAMPLE.replace("scale_decimals = 18\n", "");
        let config = DeploymentConfig::from_toml_str(&source).unwrap();
        assert!(config.pools[1].scale_decimals.is_none());

        let result = config.pools[1].to_pool_config();
        assert!(matches!(
            result,
            Err(ConfigError::Pool(PosumError::InvalidPoolConfig { .. }))
        ));
    }

    #[test]
    fn test_scale_decimals_capped() {
        let mut config = DeploymentConfig::from_toml_str(SAMPLE).unwrap();
        config.pools[1].scale_decimals = Some(40);
        assert!(config.pools[1].to_pool_config().is_err());
    }

    #[test]
    fn test_bad_address() {
        assert!(matches!(parse_address("abc"), Err(ConfigError::InvalidAddress(_))));
        let not_hex = "zz".repeat(32);
        assert!(matches!(parse_address(&not_hex), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            DeploymentConfig::from_toml_str("owner = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_params_match_constants() {
        let config = DegenPoolParams {
            asset: AssetKind::Native { decimals: 18 },
            scale: 10u128.pow(18),
            yield_rate_per_second_per_share: 1,
            points_rate_per_second: 1,
            treasury: [9u8; 32],
        }
        .into_config();
        let single = config.class(ShareClass::Single).unwrap();
        assert_eq!(single.multiplier_bps, 20_000);
        assert_eq!(single.lock, LockPolicy::Permanent);
        assert_eq!(config.scale, 10u128.pow(18));
    }

    #[test]
    fn test_defaults_use_asset_scale() {
        let usdc = AssetKind::Token { token: [0xcc; 32], decimals: 6 };
        let params = PositivePoolParams::with_defaults(usdc, 1_000, [9u8; 32]);
        assert_eq!(params.scale, 1_000_000);
        assert_eq!(params.points_rate_per_second, rates::default_points_rate(1_000_000));
        assert!(params.into_config().validate().is_ok());
    }
}
