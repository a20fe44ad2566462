use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use datanode::config::CONFIG;
use datanode::handler::ClientHandler;
use datanode::metaserver_service::MetaserverService;
use proto::generated::datanode::data_node_service_server::DataNodeServiceServer;
use storage::chunk_store::ChunkStore;
use tonic::transport::Server;
use utilities::logger::{info, init_logger, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _guard = init_logger(
        "Datanode",
        &CONFIG.datanode_addr,
        &CONFIG.log_level,
        &CONFIG.log_base,
    );
    let addr = CONFIG.datanode_addr.parse()?;

    let store = ChunkStore::open(&CONFIG.storage_path, CONFIG.storage_capacity).await?;
    if !store.health_check().await {
        warn!("Health check found issues, continuing anyway");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let heartbeat_handle = MetaserverService::new(
        store.clone(),
        CONFIG.datanode_addr.clone(),
        CONFIG.metaserver_addr.clone(),
    )
    .start_heartbeat_loop(
        Duration::from_secs(CONFIG.heartbeat_period_secs),
        shutdown.clone(),
    );

    info!(
        %addr,
        storage_path = %CONFIG.storage_path,
        storage_capacity = CONFIG.storage_capacity,
        metaserver = %CONFIG.metaserver_addr,
        "Starting the datanode grpc server"
    );
    Server::builder()
        .add_service(DataNodeServiceServer::new(ClientHandler::new(store)))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    shutdown.store(true, Ordering::SeqCst);
    let _ = heartbeat_handle.await;
    Ok(())
}
