use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis client and its shared connection manager.
///
/// The client is returned alongside the manager because blocking stream reads
/// need connections of their own; the manager serves every other command.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<(Client, ConnectionManager)> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client.clone()).await?;

    tracing::info!("Connected to Redis");
    Ok((client, manager))
}
