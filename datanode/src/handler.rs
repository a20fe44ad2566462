use proto::generated::datanode::data_node_service_server::DataNodeService;
use proto::generated::datanode::{Ack, ChunkData, ChunkRequest};
use storage::chunk_store::ChunkStore;
use storage::error::StorageError;
use storage::storage::Storage;
use tonic::{Request, Response, Status};
use utilities::logger::{error, instrument};

pub struct ClientHandler {
    store: ChunkStore,
}

impl ClientHandler {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }
}

// One unit of handler load, held for the lifetime of the guard so the
// counter is decremented on every exit path.
struct LoadGuard {
    store: ChunkStore,
}

impl LoadGuard {
    fn acquire(store: &ChunkStore) -> Self {
        store.increment_load();
        Self {
            store: store.clone(),
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.store.decrement_load();
    }
}

#[tonic::async_trait]
impl DataNodeService for ClientHandler {
    #[instrument(name = "grpc_store_chunk", skip(self, request), fields(chunk_id = %request.get_ref().chunk_id))]
    async fn store_chunk(&self, request: Request<ChunkData>) -> Result<Response<Ack>, Status> {
        let _load = LoadGuard::acquire(&self.store);
        let chunk = request.into_inner();
        let ack = match self.store.store_chunk(&chunk.chunk_id, &chunk.data).await {
            Ok(()) => Ack {
                ok: true,
                message: "Chunk stored successfully".to_owned(),
            },
            Err(e) => {
                error!(error = %e, "Failed to store chunk");
                Ack {
                    ok: false,
                    message: format!("Failed to store chunk: {e}"),
                }
            }
        };
        Ok(Response::new(ack))
    }

    #[instrument(name = "grpc_read_chunk", skip(self, request), fields(chunk_id = %request.get_ref().chunk_id))]
    async fn read_chunk(
        &self,
        request: Request<ChunkRequest>,
    ) -> Result<Response<ChunkData>, Status> {
        let _load = LoadGuard::acquire(&self.store);
        let chunk_request = request.into_inner();
        match self.store.read_chunk(&chunk_request.chunk_id).await {
            Ok(data) if !data.is_empty() => Ok(Response::new(ChunkData {
                chunk_id: chunk_request.chunk_id,
                data,
            })),
            // an empty or corrupt chunk is indistinguishable from a missing
            // one at this boundary
            Ok(_) => Err(Status::not_found(format!(
                "chunk {} not available",
                chunk_request.chunk_id
            ))),
            Err(StorageError::NotFound(_)) | Err(StorageError::ChecksumMismatch { .. }) => {
                Err(Status::not_found(format!(
                    "chunk {} not available",
                    chunk_request.chunk_id
                )))
            }
            Err(e) => {
                error!(error = %e, "Failed to read chunk");
                Err(Status::internal(format!("Failed to read chunk: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    async fn handler_with_capacity(dir: &tempfile::TempDir, capacity: i64) -> ClientHandler {
        let store = ChunkStore::open(dir.path(), capacity).await.unwrap();
        ClientHandler::new(store)
    }

    #[tokio::test]
    async fn store_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler_with_capacity(&dir, 1024 * 1024).await;
        let ack = handler
            .store_chunk(Request::new(ChunkData {
                chunk_id: "12_0_0".to_owned(),
                data: b"roundtrip payload".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(ack.ok);
        assert_eq!(ack.message, "Chunk stored successfully");

        let chunk = handler
            .read_chunk(Request::new(ChunkRequest {
                chunk_id: "12_0_0".to_owned(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(chunk.chunk_id, "12_0_0");
        assert_eq!(chunk.data, b"roundtrip payload");
    }

    #[tokio::test]
    async fn reading_a_missing_chunk_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler_with_capacity(&dir, 1024 * 1024).await;
        let status = handler
            .read_chunk(Request::new(ChunkRequest {
                chunk_id: "99_0_0".to_owned(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn store_over_capacity_is_rejected_in_band() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler_with_capacity(&dir, 4).await;
        let ack = handler
            .store_chunk(Request::new(ChunkData {
                chunk_id: "13_0_0".to_owned(),
                data: b"does not fit".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!ack.ok);
        assert!(ack.message.contains("insufficient storage space"));
    }

    #[tokio::test]
    async fn load_counter_returns_to_zero_after_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), 1024 * 1024).await.unwrap();
        let handler = ClientHandler::new(store.clone());
        handler
            .store_chunk(Request::new(ChunkData {
                chunk_id: "14_0_0".to_owned(),
                data: b"payload".to_vec(),
            }))
            .await
            .unwrap();
        let _ = handler
            .read_chunk(Request::new(ChunkRequest {
                chunk_id: "missing".to_owned(),
            }))
            .await;
        assert_eq!(store.load(), 0);
    }
}
