use thiserror::Error;

/// Unified error type for the proxy pool
#[derive(Error, Debug)]
pub enum PoolError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Selection errors
    #[error("No proxies match the requested criteria")]
    EmptyPool,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Whether the backing store itself is unreachable or broken.
    ///
    /// These are the only errors a store operation propagates; everything
    /// else degrades to sentinel data or an empty result set.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, PoolError::Database(_) | PoolError::DatabaseConnection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_classification() {
        assert!(PoolError::DatabaseConnection("refused".to_string()).is_store_failure());
        assert!(PoolError::Database(sqlx::Error::PoolClosed).is_store_failure());
        assert!(!PoolError::EmptyPool.is_store_failure());
        assert!(!PoolError::InvalidConfig("bad".to_string()).is_store_failure());
    }

    #[test]
    fn test_empty_pool_message() {
        assert_eq!(
            PoolError::EmptyPool.to_string(),
            "No proxies match the requested criteria"
        );
    }
}
