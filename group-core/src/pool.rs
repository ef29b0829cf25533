// group-core/src/pool.rs

//! Store client pooling.
//!
//! Every coordinator operation borrows one client for its whole duration
//! and gives it back when the [`PooledClient`] guard drops, on success and
//! on error alike. Clients that reported a connection failure are closed
//! instead of being returned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use group_core::pool::{ResourcePool, StorePool};
//! use group_core::store::MemoryStore;
//!
//! # async fn example() -> group_core::Result<()> {
//! let pool = StorePool::new(Arc::new(MemoryStore::new()), Default::default());
//! let mut client = pool.acquire().await?;
//! client.sadd("lobby", 7).await?;
//! // Returned to the pool here
//! drop(client);
//! # Ok(())
//! # }
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::StoreConfig;
use crate::error::{GroupError, Result};
use crate::store::{MemoryStore, StoreClient};

/// Opens new store clients on demand.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreClient>>;
}

#[async_trait]
impl ClientFactory for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreClient>> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl ClientFactory for crate::store::RedisConnector {
    async fn connect(&self) -> Result<Box<dyn StoreClient>> {
        Ok(Box::new(self.open().await?))
    }
}

/// Lends store clients for the duration of one logical operation.
#[async_trait]
pub trait ResourcePool: Send + Sync {
    /// Borrows a client. It goes back to the pool when the guard drops.
    ///
    /// # Errors
    ///
    /// Returns an error if no client frees up within the acquire timeout
    /// or a new client cannot be opened.
    async fn acquire(&self) -> Result<PooledClient>;

    /// Snapshot of pool counters.
    fn stats(&self) -> PoolStats;
}

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of clients lent out at once.
    pub max_size: usize,
    /// Maximum time to wait for a free client.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&StoreConfig> for PoolConfig {
    fn from(store: &StoreConfig) -> Self {
        Self {
            max_size: store.pool_size,
            acquire_timeout: store.acquire_timeout(),
        }
    }
}

/// Pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Clients opened through the factory.
    pub created: u64,
    /// Clients closed after a connection failure.
    pub discarded: u64,
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Clients currently idle.
    pub idle: usize,
}

type IdleList = Arc<Mutex<Vec<Box<dyn StoreClient>>>>;

/// A client borrowed from a [`StorePool`].
pub struct PooledClient {
    client: Option<Box<dyn StoreClient>>,
    idle: IdleList,
    discarded: Arc<AtomicU64>,
    // Released after the client is back on the idle list.
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledClient {
    type Target = dyn StoreClient;

    fn deref(&self) -> &Self::Target {
        match self.client.as_ref() {
            Some(client) => client.as_ref(),
            None => unreachable!("client is only taken on drop"),
        }
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.client.as_mut() {
            Some(client) => client.as_mut(),
            None => unreachable!("client is only taken on drop"),
        }
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if client.is_healthy() {
                self.idle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(client);
            } else {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Semaphore-bounded pool over a [`ClientFactory`].
///
/// Idle clients are reused LIFO; new ones are opened lazily up to
/// `max_size`.
pub struct StorePool {
    factory: Arc<dyn ClientFactory>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: IdleList,
    created: AtomicU64,
    acquisitions: AtomicU64,
    discarded: Arc<AtomicU64>,
}

impl StorePool {
    pub fn new(factory: Arc<dyn ClientFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            permits: Arc::new(Semaphore::new(config.max_size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(config.max_size))),
            config,
            created: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
            discarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pool over an in-process store.
    pub fn memory(store: MemoryStore, config: PoolConfig) -> Self {
        Self::new(Arc::new(store), config)
    }

    /// Pool over Redis connections to `url`.
    #[cfg(feature = "redis")]
    pub fn redis(url: &str, config: PoolConfig) -> Result<Self> {
        let connector = crate::store::RedisConnector::from_url(url)?;
        Ok(Self::new(Arc::new(connector), config))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl ResourcePool for StorePool {
    async fn acquire(&self) -> Result<PooledClient> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            GroupError::pool(format!(
                "timed out after {}ms waiting for a store client",
                self.config.acquire_timeout.as_millis()
            ))
        })?
        .map_err(|_| GroupError::pool("pool is closed"))?;

        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let client = match reused {
            Some(client) => client,
            None => {
                let client = self
                    .factory
                    .connect()
                    .await
                    .map_err(|e| GroupError::pool_with_source("failed to open store client", e))?;
                self.created.fetch_add(1, Ordering::Relaxed);
                client
            }
        };

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(PooledClient {
            client: Some(client),
            idle: self.idle.clone(),
            discarded: self.discarded.clone(),
            _permit: permit,
        })
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            idle: self
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}
