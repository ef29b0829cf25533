// group-core/src/store/redis.rs

//! Redis store backend.
//!
//! Each `RedisStore` owns one multiplexed connection. The pool hands a store
//! to a single operation at a time, so `SELECT` issued at the start of an
//! operation applies to every command that follows it.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, RedisError, Value};

use super::traits::{ConnId, StoreClient, Transaction, TxCommand};
use crate::error::{GroupError, Result};

/// Store client backed by a Redis connection.
pub struct RedisStore {
    conn: MultiplexedConnection,
    healthy: bool,
}

impl RedisStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            healthy: true,
        }
    }

    /// Opens a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GroupError::store_with_source("connect", "invalid store URL", e))?;
        RedisConnector::new(client).open().await
    }

    async fn query<T: FromRedisValue>(&mut self, operation: &'static str, cmd: &redis::Cmd) -> Result<T> {
        match cmd.query_async(&mut self.conn).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(operation, e)),
        }
    }

    fn fail(&mut self, operation: &'static str, e: RedisError) -> GroupError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            self.healthy = false;
        }
        GroupError::store_with_source(operation, "command failed", e)
    }
}

/// Interprets a transaction reply the way a caller checks for success.
fn reply_ok(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Int(n) => *n != 0,
        Value::Okay | Value::SimpleString(_) => true,
        Value::BulkString(bytes) => !bytes.is_empty(),
        _ => true,
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn select(&mut self, database: u32) -> Result<()> {
        self.query::<()>("SELECT", redis::cmd("SELECT").arg(database))
            .await
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.query::<()>("SET", redis::cmd("SET").arg(key).arg(value))
            .await
    }

    async fn del(&mut self, key: &str) -> Result<u64> {
        self.query("DEL", redis::cmd("DEL").arg(key)).await
    }

    async fn set_nx(&mut self, key: &str, value: &str) -> Result<bool> {
        self.query("SETNX", redis::cmd("SETNX").arg(key).arg(value))
            .await
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        self.query("EXISTS", redis::cmd("EXISTS").arg(key)).await
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool> {
        self.query("EXPIRE", redis::cmd("EXPIRE").arg(key).arg(ttl.as_secs()))
            .await
    }

    async fn exec(&mut self, tx: &Transaction) -> Result<Vec<bool>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in tx.commands() {
            match command {
                TxCommand::Set { key, value } => {
                    pipe.cmd("SET").arg(key).arg(value);
                }
                TxCommand::Expire { key, ttl } => {
                    pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs());
                }
            }
        }

        let replies: Option<Vec<Value>> = match pipe.query_async(&mut self.conn).await {
            Ok(replies) => replies,
            Err(e) => return Err(self.fail("EXEC", e)),
        };

        // A nil EXEC reply means the server discarded the batch.
        let replies = replies.ok_or_else(|| GroupError::transaction("EXEC returned nil"))?;
        Ok(replies.iter().map(reply_ok).collect())
    }

    async fn sadd(&mut self, key: &str, member: ConnId) -> Result<u64> {
        self.query("SADD", redis::cmd("SADD").arg(key).arg(member))
            .await
    }

    async fn srem(&mut self, key: &str, member: ConnId) -> Result<u64> {
        self.query("SREM", redis::cmd("SREM").arg(key).arg(member))
            .await
    }

    async fn sismember(&mut self, key: &str, member: ConnId) -> Result<bool> {
        self.query("SISMEMBER", redis::cmd("SISMEMBER").arg(key).arg(member))
            .await
    }

    async fn scard(&mut self, key: &str) -> Result<u64> {
        self.query("SCARD", redis::cmd("SCARD").arg(key)).await
    }

    async fn srandmember(&mut self, key: &str, count: usize) -> Result<Vec<ConnId>> {
        // A positive count asks for distinct members.
        self.query("SRANDMEMBER", redis::cmd("SRANDMEMBER").arg(key).arg(count))
            .await
    }

    async fn smembers(&mut self, key: &str) -> Result<Vec<ConnId>> {
        self.query("SMEMBERS", redis::cmd("SMEMBERS").arg(key))
            .await
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.query("KEYS", redis::cmd("KEYS").arg(pattern)).await
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn backend_type(&self) -> &'static str {
        "redis"
    }
}

/// Opens new `RedisStore` connections for the pool.
#[derive(Clone)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Creates a connector for `url` without connecting yet.
    pub fn from_url(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GroupError::store_with_source("connect", "invalid store URL", e))?;
        Ok(Self::new(client))
    }

    pub(crate) async fn open(&self) -> Result<RedisStore> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(RedisStore::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_ok() {
        assert!(reply_ok(&Value::Okay));
        assert!(reply_ok(&Value::Int(1)));
        assert!(!reply_ok(&Value::Int(0)));
        assert!(!reply_ok(&Value::Nil));
        assert!(reply_ok(&Value::SimpleString("OK".to_string())));
    }

    #[test]
    fn test_connector_rejects_bad_url() {
        assert!(RedisConnector::from_url("not a url").is_err());
    }

    #[test]
    fn test_connector_accepts_url() {
        assert!(RedisConnector::from_url("redis://127.0.0.1:6379/0").is_ok());
    }
}
