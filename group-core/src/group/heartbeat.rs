// group-core/src/group/heartbeat.rs

//! Leader liveness ping.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{GroupError, Result};
use crate::pool::ResourcePool;
use crate::scheduler::{schedule_repeating, TaskHandle};
use crate::store::Transaction;

use super::keys::GroupKeys;

/// Everything one ping needs, cheap to clone into the background task.
#[derive(Clone)]
pub(crate) struct Heartbeat {
    pool: Arc<dyn ResourcePool>,
    database: u32,
    ping_key: String,
    ttl: Duration,
}

impl Heartbeat {
    pub(crate) fn new(
        pool: Arc<dyn ResourcePool>,
        database: u32,
        keys: &GroupKeys,
        ttl: Duration,
    ) -> Self {
        Self {
            pool,
            database,
            ping_key: keys.ping().to_string(),
            ttl,
        }
    }

    /// Refreshes the ping record in one transaction.
    ///
    /// Fails unless every command in the batch reports success.
    pub(crate) async fn ping(&self) -> Result<()> {
        let mut client = self.pool.acquire().await?;
        client.select(self.database).await?;

        let tx = Transaction::new()
            .set(self.ping_key.as_str(), "")
            .expire(self.ping_key.as_str(), self.ttl);
        let replies = client.exec(&tx).await?;

        if replies.len() != tx.len() || replies.iter().any(|ok| !ok) {
            return Err(GroupError::transaction(format!(
                "heartbeat replies {:?}",
                replies
            )));
        }
        Ok(())
    }

    /// Pings every `interval` until the handle is cancelled.
    pub(crate) fn start(self, interval: Duration) -> TaskHandle {
        schedule_repeating(interval, move || {
            let heartbeat = self.clone();
            async move {
                if let Err(e) = heartbeat.ping().await {
                    tracing::warn!("Heartbeat failed: {}", e);
                }
            }
        })
    }
}
