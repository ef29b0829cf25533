// group-core/src/error.rs

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum GroupError {

    #[error("Store error during {operation}: {message}")]
    Store {
        operation: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Connection pool error: {message}")]
    Pool {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Group leadership conflict: '{holder}' is still alive, refusing to start '{current}'")]
    LeadershipConflict {
        holder: String,
        current: String,
    },

    #[error("Transaction rejected: {message}")]
    Transaction {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, GroupError>;

// Convenience constructors
impl GroupError {

    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn store_with_source(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
            source: None,
        }
    }

    pub fn pool_with_source(message: impl Into<String>, source: GroupError) -> Self {
        Self::Pool {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn leadership_conflict(holder: impl Into<String>, current: impl Into<String>) -> Self {
        Self::LeadershipConflict {
            holder: holder.into(),
            current: current.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Returns true if the process must not keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LeadershipConflict { .. })
    }

    /// Returns true if a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::Pool { .. } | Self::Transaction { .. }
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for GroupError {
    fn from(err: redis::RedisError) -> Self {
        Self::store_with_source("redis", err.to_string(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_leadership_conflict_is_fatal() {
        let err = GroupError::leadership_conflict("100-a", "200-b");
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("100-a"));
        assert!(msg.contains("200-b"));
    }

    #[test]
    fn test_store_error_is_retryable() {
        let err = GroupError::store("SADD", "connection reset");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Store error during SADD: connection reset"
        );
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = GroupError::config_with_source("failed to read config file", io);
        assert!(err.source().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pool_error_wraps_store_error() {
        let cause = GroupError::store("connect", "refused");
        let err = GroupError::pool_with_source("failed to open client", cause);
        assert!(err.to_string().contains("failed to open client"));
        assert!(err.source().unwrap().to_string().contains("refused"));
    }
}
