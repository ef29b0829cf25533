// group-core/src/lib.rs

//! Group Coordinator - Core Library
//!
//! Store-backed broadcast group membership for clustered servers: leader
//! election over a shared key-value store, a heartbeat that proves the
//! leader is alive, and idempotent group membership operations.

pub mod config;
pub mod error;
pub mod store;

// Re-export commonly used types for convenience
pub use config::CoordinatorConfig;
pub use error::{GroupError, Result};
pub use store::{ConnId, MemoryStore, StoreClient};

pub mod pool;
pub use pool::{PoolConfig, PooledClient, ResourcePool, StorePool};

pub mod identity;
pub use identity::{LeaderId, ProcessGeneration, ProcessIdentity};

pub mod scheduler;
pub use scheduler::{schedule_repeating, TaskHandle};

pub mod group;
pub use group::{CloseOutcome, GroupCoordinator, GroupMeta, Leadership, PurgeReport};
