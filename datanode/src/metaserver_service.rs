use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use proto::generated::metaserver::meta_service_client::MetaServiceClient;
use proto::generated::metaserver::{DataNodeHeartbeat, DataNodeInfo};
use storage::chunk_store::ChunkStore;
use storage::storage::Storage;
use tokio::time::{interval, timeout};
use tonic::transport::Channel;
use utilities::grpc_channel_pool::GRPC_CHANNEL_POOL;
use utilities::logger::{error, info, trace};
use utilities::result::Result;
use utilities::retry_policy::retry_with_backoff;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);
pub const HEARTBEAT_DEADLINE: Duration = Duration::from_secs(5);

/// Client side of the coordinator protocol: one-shot registration and the
/// periodic heartbeat reporting free space, load and the chunk inventory.
pub struct MetaserverService {
    store: ChunkStore,
    datanode_addr: String,
    metaserver_addr: String,
}

impl MetaserverService {
    pub fn new(store: ChunkStore, datanode_addr: String, metaserver_addr: String) -> Self {
        Self {
            store,
            datanode_addr,
            metaserver_addr,
        }
    }

    async fn client(&self) -> Result<MetaServiceClient<Channel>> {
        let channel = GRPC_CHANNEL_POOL.get_channel(&self.metaserver_addr).await?;
        Ok(MetaServiceClient::new(channel))
    }

    pub async fn register(&self) -> Result<bool> {
        let request = DataNodeInfo {
            address: self.datanode_addr.clone(),
            available_space: self.store.free_space(),
        };
        let mut client = self.client().await?;
        let response = client
            .register_data_node(tonic::Request::new(request))
            .await
            .map_err(|e| format!("Error while registering with metaserver {e}"))?
            .into_inner();
        Ok(response.ok)
    }

    /// Sends one heartbeat and returns the chunk ids the metaserver wants
    /// deleted.
    pub async fn send_heartbeat(&self) -> Result<Vec<String>> {
        let heartbeat = DataNodeHeartbeat {
            address: self.datanode_addr.clone(),
            available_space: self.store.free_space(),
            current_load: self.store.load(),
            stored_chunk_ids: self.store.stored_chunk_ids().await,
        };
        let mut client = self.client().await?;
        let response = timeout(
            HEARTBEAT_DEADLINE,
            client.heartbeat(tonic::Request::new(heartbeat)),
        )
        .await
        .map_err(|_| "Heartbeat deadline exceeded")??
        .into_inner();
        Ok(response.chunks_to_delete)
    }

    /// Registers (with backoff) and then heartbeats until the shutdown flag
    /// is raised. A failed registration is logged and left to heartbeat
    /// auto-registration; a failed heartbeat is retried at the next tick.
    pub fn start_heartbeat_loop(
        self,
        period: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match retry_with_backoff(|| self.register(), 3).await {
                Ok(true) => info!("Registered with metaserver successfully"),
                Ok(false) => error!("Metaserver refused registration"),
                Err(e) => error!(error = %e, "Failed to register with metaserver"),
            }
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match self.send_heartbeat().await {
                    Ok(chunks_to_delete) => {
                        if chunks_to_delete.is_empty() {
                            trace!("Heartbeat sent");
                            continue;
                        }
                        trace!(
                            count = chunks_to_delete.len(),
                            "Metaserver requested chunk deletions"
                        );
                        let deletes = chunks_to_delete
                            .iter()
                            .map(|chunk_id| self.store.delete_chunk(chunk_id));
                        for result in join_all(deletes).await {
                            if let Err(e) = result {
                                error!(error = %e, "Failed to delete chunk requested by metaserver");
                            }
                        }
                    }
                    Err(e) => error!(error = %e, "Error while sending heartbeat"),
                }
            }
            info!("Heartbeat loop stopped");
        })
    }
}
