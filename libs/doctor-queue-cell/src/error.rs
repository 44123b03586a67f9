use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    PoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Queue store timeout: operation took longer than {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Queue store unavailable: {0}")]
    Unavailable(String),
}

impl QueueError {
    /// Errors that say the store itself is unreachable, as opposed to a
    /// single bad payload.
    pub fn is_connectivity(&self) -> bool {
        match self {
            QueueError::RedisError(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            QueueError::PoolError(_) | QueueError::Timeout { .. } | QueueError::Unavailable(_) => true,
            QueueError::SerializationError(_) => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for QueueError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        QueueError::PoolError(e.to_string())
    }
}

impl From<deadpool_redis::CreatePoolError> for QueueError {
    fn from(e: deadpool_redis::CreatePoolError) -> Self {
        QueueError::PoolError(e.to_string())
    }
}
