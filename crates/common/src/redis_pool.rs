use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis connection manager for the backup job queue.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;
    ping(&mut manager).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}

/// Round-trip a `PING` to verify the connection is usable.
pub async fn ping(redis: &mut ConnectionManager) -> anyhow::Result<()> {
    let pong: String = redis::cmd("PING").query_async(redis).await?;
    if pong != "PONG" {
        anyhow::bail!("Unexpected PING reply from Redis: {pong}");
    }
    Ok(())
}
