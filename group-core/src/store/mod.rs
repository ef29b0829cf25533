// group-core/src/store/mod.rs

//! Shared store abstraction for group coordination.
//!
//! The coordinator talks to the store through the [`StoreClient`] trait so
//! that the same leadership and membership logic runs against Redis in
//! production and against [`MemoryStore`] in local-only mode and tests.
//!
//! # Example
//!
//! ```no_run
//! use group_core::store::{MemoryStore, StoreClient};
//!
//! # async fn example() -> group_core::Result<()> {
//! let mut store = MemoryStore::new();
//! store.select(0).await?;
//! store.sadd("IMI.GROUP.KEY.lobby", 42).await?;
//! assert_eq!(store.scard("IMI.GROUP.KEY.lobby").await?, 1);
//! # Ok(())
//! # }
//! ```

mod memory;
mod traits;

pub use memory::MemoryStore;
#[cfg(test)]
pub(crate) use memory::glob_match;
pub use traits::{ConnId, StoreClient, Transaction, TxCommand};

// Redis backend (requires feature flag)
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use self::redis::{RedisConnector, RedisStore};
