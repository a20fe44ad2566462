use std::collections::HashSet;
use std::sync::Arc;

use proto::generated::metaserver::meta_service_server::MetaService;
use proto::generated::metaserver::{
    Ack, ChunkAllocationRequest, ChunkLocation, DataNodeHeartbeat, DataNodeInfo,
    FileLocationRequest, FileLocationResponse, HeartbeatResponse,
};
use tonic::{Request, Response, Status};
use utilities::logger::{debug, instrument, warn};

use crate::cache::{ChunkLocationInfo, LocationCache};
use crate::chunk_id::{ChunkIdGenerator, DefaultChunkIdGenerator};
use crate::datanode_tracker::DataNodeTracker;
use crate::namespace::Namespace;

pub struct MetaServiceHandler {
    tracker: Arc<DataNodeTracker>,
    namespace: Arc<Namespace>,
    cache: Arc<LocationCache>,
    id_generator: Box<dyn ChunkIdGenerator + Send + Sync>,
}

impl MetaServiceHandler {
    pub fn new(
        tracker: Arc<DataNodeTracker>,
        namespace: Arc<Namespace>,
        cache: Arc<LocationCache>,
    ) -> Self {
        Self {
            tracker,
            namespace,
            cache,
            id_generator: Box::new(DefaultChunkIdGenerator::default()),
        }
    }
}

#[tonic::async_trait]
impl MetaService for MetaServiceHandler {
    #[instrument(name = "grpc_register_datanode", skip(self, request), fields(address = %request.get_ref().address))]
    async fn register_data_node(
        &self,
        request: Request<DataNodeInfo>,
    ) -> Result<Response<Ack>, Status> {
        let info = request.into_inner();
        self.tracker.register(&info.address, info.available_space);
        Ok(Response::new(Ack {
            ok: true,
            message: "DataNode registered successfully".to_owned(),
        }))
    }

    #[instrument(name = "grpc_heartbeat", skip(self, request), fields(address = %request.get_ref().address))]
    async fn heartbeat(
        &self,
        request: Request<DataNodeHeartbeat>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let heartbeat = request.into_inner();
        self.tracker.heartbeat(
            &heartbeat.address,
            heartbeat.stored_chunk_ids.clone(),
            heartbeat.available_space,
            heartbeat.current_load,
        );
        // the heartbeat is the authoritative claim for these chunks
        for chunk_id in &heartbeat.stored_chunk_ids {
            self.namespace.record_holder(chunk_id, &heartbeat.address);
        }
        Ok(Response::new(HeartbeatResponse {
            ok: true,
            chunks_to_delete: vec![],
        }))
    }

    #[instrument(
        name = "grpc_allocate_chunk_location",
        skip(self, request),
        fields(filename = %request.get_ref().filename, chunk_index = %request.get_ref().chunk_index)
    )]
    async fn allocate_chunk_location(
        &self,
        request: Request<ChunkAllocationRequest>,
    ) -> Result<Response<ChunkLocation>, Status> {
        let alloc = request.into_inner();
        if alloc.chunk_index < 0 {
            return Err(Status::invalid_argument("chunk_index must be non-negative"));
        }
        let chunk_id = self.id_generator.next_id(&alloc.filename, alloc.chunk_index);
        let Some(address) = self.tracker.select_for_chunk(alloc.chunk_size) else {
            warn!("No datanode available for chunk allocation");
            return Err(Status::resource_exhausted(
                "No available DataNode for chunk allocation",
            ));
        };
        self.namespace.record_allocation(
            &alloc.filename,
            alloc.chunk_index as usize,
            &chunk_id,
            alloc.chunk_size,
            &address,
        );
        debug!(%chunk_id, %address, "Allocated chunk");
        Ok(Response::new(ChunkLocation {
            chunk_id,
            datanode_addresses: vec![address],
        }))
    }

    #[instrument(name = "grpc_get_file_location", skip(self, request), fields(filename = %request.get_ref().filename))]
    async fn get_file_location(
        &self,
        request: Request<FileLocationRequest>,
    ) -> Result<Response<FileLocationResponse>, Status> {
        let lookup = request.into_inner();
        let Some(chunk_ids) = self.namespace.chunk_ids_of(&lookup.filename) else {
            return Ok(Response::new(FileLocationResponse {
                found: false,
                chunks: vec![],
            }));
        };
        // snapshot the active set first so the workers lock is never taken
        // after the chunks lock
        let active: HashSet<String> = self.tracker.active_addresses().into_iter().collect();
        let mut chunks = Vec::new();
        for chunk_id in chunk_ids.iter().filter(|id| !id.is_empty()) {
            if let Some(info) = self.cache.get(chunk_id) {
                chunks.push(ChunkLocation {
                    chunk_id: info.chunk_id,
                    datanode_addresses: info.datanode_addresses,
                });
                continue;
            }
            let addresses: Vec<String> = self
                .namespace
                .holders_of(chunk_id)
                .into_iter()
                .filter(|address| active.contains(address))
                .collect();
            if addresses.is_empty() {
                debug!(%chunk_id, "Chunk has no reachable datanode");
                continue;
            }
            self.cache.put(
                chunk_id,
                ChunkLocationInfo {
                    chunk_id: chunk_id.clone(),
                    datanode_addresses: addresses.clone(),
                },
            );
            chunks.push(ChunkLocation {
                chunk_id: chunk_id.clone(),
                datanode_addresses: addresses,
            });
        }
        Ok(Response::new(FileLocationResponse {
            found: true,
            chunks,
        }))
    }
}
