//! POSUM Pool Registry
//!
//! Degen and Positive yield pools behind one registry.
//!
//! ## Pools
//!
//! - **Degen**: a single permanently locked share class; deposits can never
//!   be withdrawn but earn SUM points at 2x
//! - **Positive**: Flex shares (1x, withdraw any time) and Locked shares
//!   (1.5x, timed lock that every new Locked deposit may extend)
//!
//! Every deposit, withdrawal, claim and lock conversion settles the user's
//! yield and SUM points first, then moves assets through the
//! [`posum_common::AssetCustody`] collaborator, then commits. Writes return a
//! [`Receipt`]; reads go through typed methods or the uniform [`PoolQuery`].
//!
//! ```no_run
//! use posum_pool_registry::{DeploymentConfig, PoolRegistry};
//! use posum_common::InMemoryCustody;
//!
//! let config = DeploymentConfig::load("deployment.toml").unwrap();
//! let registry = PoolRegistry::from_config(&config, InMemoryCustody::new()).unwrap();
//! assert_eq!(registry.pool_count(), config.pools.len());
//! ```

pub mod config;
pub mod dashboard;
pub mod pool;
pub mod query;
pub mod registry;


pub use config::{ConfigError, DegenPoolParams, DeploymentConfig, PoolEntry, PositivePoolParams};
pub use dashboard::{PoolHolding, PortfolioSummary};
pub use pool::PoolEngine;
pub use query::{ActionOutcome, PoolAction, PoolQuery, Receipt};
pub use registry::PoolRegistry;
