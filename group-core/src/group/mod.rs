// group-core/src/group/mod.rs

//! Group membership coordination.
//!
//! Membership lives in the shared store as one integer set per group under
//! `<key>.<group>`. A single process generation at a time holds the leader
//! record at `<key>` and proves it is alive by refreshing `<key>-PING`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use group_core::config::CoordinatorConfig;
//! use group_core::group::GroupCoordinator;
//! use group_core::identity::ProcessGeneration;
//! use group_core::pool::{PoolConfig, StorePool};
//! use group_core::store::MemoryStore;
//!
//! # async fn example() -> group_core::Result<()> {
//! let config = CoordinatorConfig::default();
//! let pool = StorePool::memory(MemoryStore::new(), PoolConfig::from(&config.store));
//! let coordinator = GroupCoordinator::new(
//!     &config,
//!     Arc::new(pool),
//!     Arc::new(ProcessGeneration::new()),
//! )?;
//!
//! coordinator.initialize().await?;
//! coordinator.join_group("lobby", 17).await?;
//! let fds = coordinator.get_fds("lobby").await?;
//! coordinator.shutdown();
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod heartbeat;
mod keys;
mod leadership;
mod meta;

pub use coordinator::{CloseOutcome, GroupCoordinator};
pub use keys::GroupKeys;
pub use leadership::{Leadership, PurgeReport};
pub use meta::GroupMeta;
