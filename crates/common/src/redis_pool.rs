use std::time::Duration;

use redis::Client;
use redis::aio::ConnectionManager;

use crate::error::CacheError;

/// Create a Redis connection manager for async operations.
///
/// The initial connect is bounded by `timeout`; a manager that connects
/// reconnects on its own afterwards.
pub async fn create_redis_pool(
    client: &Client,
    timeout: Duration,
) -> Result<ConnectionManager, CacheError> {
    let manager = tokio::time::timeout(timeout, ConnectionManager::new(client.clone()))
        .await
        .map_err(|_| CacheError::Timeout(timeout))??;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
