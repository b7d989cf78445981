use ring_cache::cache::handlers::router;
use ring_cache::cache::manager::CacheRingManager;
use ring_cache::config::Config;
use ring_cache::membership::service::MembershipTracker;
use ring_cache::membership::store::{HeartbeatStore, MemoryHeartbeatStore, RedisHeartbeatStore};
use ring_cache::replication::HttpReplicationClient;
use ring_cache::storage::backing::{FsObjectStore, MemoryObjectStore, ObjectStore};
use ring_cache::storage::persistence::PersistenceGateway;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    tracing::info!("Starting node {} on {}", config.node_address, config.bind_addr);

    // 1. Membership (heartbeats):
    let heartbeats: Arc<dyn HeartbeatStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisHeartbeatStore::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set, heartbeats stay in-process (single node only)");
            Arc::new(MemoryHeartbeatStore::new())
        }
    };
    let membership = MembershipTracker::new(
        config.node_address.clone(),
        heartbeats,
        config.heartbeat_key_prefix.clone(),
        config.heartbeat_timeout,
    );

    // 2. Backing store:
    let objects: Arc<dyn ObjectStore> = match &config.store_dir {
        Some(dir) => Arc::new(FsObjectStore::open(dir).await?),
        None => {
            tracing::warn!("STORE_DIR not set, persisted values are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };
    let persistence = PersistenceGateway::with_page_size(objects, config.list_page_size);

    // 3. Peer replication:
    let replication = Arc::new(HttpReplicationClient::new(config.peer_timeout)?);

    // 4. Join the ring (fatal if the first heartbeat cannot be published):
    let manager = CacheRingManager::start(membership, persistence, replication).await?;

    // 5. Optional self-driven heartbeat renewal:
    if let Some(every) = config.heartbeat_interval {
        let renewer = manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick fires immediately; start() just published
            interval.tick().await;

            loop {
                interval.tick().await;
                if let Err(e) = renewer.renew_heartbeat().await {
                    tracing::error!("Heartbeat renewal failed: {}", e);
                }
            }
        });
        tracing::info!("Renewing heartbeat every {:?}", every);
    }

    // 6. Start HTTP server:
    let app = router(manager);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    tracing::info!("HTTP server listening on {}", config.bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Node {} stopped", config.node_address);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
