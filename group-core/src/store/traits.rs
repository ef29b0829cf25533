// group-core/src/store/traits.rs

//! Store client abstraction.
//!
//! The coordinator only needs a small slice of a key-value store: plain
//! string keys, integer sets, key expiry, a prefix scan and an atomic
//! batch. Any backend that provides those semantics can sit behind
//! [`StoreClient`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Identifier of a live connection (a socket fd on the serving process).
pub type ConnId = u64;

/// A command queued inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxCommand {
    /// Overwrite `key` with `value`, clearing any expiry.
    Set { key: String, value: String },
    /// Expire `key` after `ttl` (second resolution).
    Expire { key: String, ttl: Duration },
}

/// An ordered batch of commands committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    commands: Vec<TxCommand>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.commands.push(TxCommand::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.commands.push(TxCommand::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn commands(&self) -> &[TxCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A single client connection to the shared store.
///
/// Methods take `&mut self`: a client is lent to exactly one logical
/// operation at a time by the pool.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Selects the logical database for subsequent commands.
    async fn select(&mut self, database: u32) -> Result<()>;

    /// Returns the string stored at `key`, if any.
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Stores `value` at `key`, clearing any expiry.
    async fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Deletes `key`. Returns the number of keys removed.
    async fn del(&mut self, key: &str) -> Result<u64>;

    /// Stores `value` at `key` only if `key` does not exist.
    ///
    /// Returns true if the value was written.
    async fn set_nx(&mut self, key: &str, value: &str) -> Result<bool>;

    /// Returns true if `key` exists and has not expired.
    async fn exists(&mut self, key: &str) -> Result<bool>;

    /// Sets a time-to-live on `key`. Returns false if the key does not exist.
    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool>;

    /// Commits `tx` atomically.
    ///
    /// Returns one success flag per command, in order.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Transaction`](crate::GroupError::Transaction)
    /// if the store refused to commit the batch.
    async fn exec(&mut self, tx: &Transaction) -> Result<Vec<bool>>;

    /// Adds `member` to the set at `key`. Returns the number of members added.
    async fn sadd(&mut self, key: &str, member: ConnId) -> Result<u64>;

    /// Removes `member` from the set at `key`. Returns the number removed.
    async fn srem(&mut self, key: &str, member: ConnId) -> Result<u64>;

    /// Returns true if `member` belongs to the set at `key`.
    async fn sismember(&mut self, key: &str, member: ConnId) -> Result<bool>;

    /// Returns the cardinality of the set at `key` (0 if absent).
    async fn scard(&mut self, key: &str) -> Result<u64>;

    /// Returns up to `count` distinct random members of the set at `key`.
    async fn srandmember(&mut self, key: &str, count: usize) -> Result<Vec<ConnId>>;

    /// Returns every member of the set at `key`.
    async fn smembers(&mut self, key: &str) -> Result<Vec<ConnId>>;

    /// Returns the names of all keys matching a glob `pattern`.
    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>>;

    /// Returns false once the client has seen a connection-level failure
    /// and should not be handed out again.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Returns the backend type name (e.g., "memory", "redis").
    fn backend_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_builder_keeps_order() {
        let tx = Transaction::new()
            .set("K-PING", "")
            .expire("K-PING", Duration::from_secs(8));

        assert_eq!(tx.len(), 2);
        assert_eq!(
            tx.commands()[0],
            TxCommand::Set {
                key: "K-PING".to_string(),
                value: String::new(),
            }
        );
        assert!(matches!(
            tx.commands()[1],
            TxCommand::Expire { ref key, ttl } if key == "K-PING" && ttl.as_secs() == 8
        ));
    }

    #[test]
    fn test_empty_transaction() {
        let tx = Transaction::new();
        assert!(tx.is_empty());
    }
}
