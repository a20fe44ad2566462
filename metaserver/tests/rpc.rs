use std::sync::Arc;
use std::time::Duration;

use metaserver::cache::LocationCache;
use metaserver::datanode_tracker::DataNodeTracker;
use metaserver::handler::MetaServiceHandler;
use metaserver::namespace::Namespace;
use metaserver::selection_policy::LeastLoadedPolicy;
use proto::generated::metaserver::meta_service_server::MetaService;
use proto::generated::metaserver::{
    ChunkAllocationRequest, ChunkLocation, DataNodeHeartbeat, DataNodeInfo, FileLocationRequest,
};
use tonic::{Code, Request, Status};

const GIB: i64 = 1024 * 1024 * 1024;
const MIB: i64 = 1024 * 1024;

fn handler() -> MetaServiceHandler {
    let tracker = Arc::new(DataNodeTracker::new(Box::new(LeastLoadedPolicy)));
    MetaServiceHandler::new(tracker, Arc::new(Namespace::new()), Arc::new(LocationCache::new(1000)))
}

async fn register(handler: &MetaServiceHandler, address: &str, available_space: i64) {
    let response = handler
        .register_data_node(Request::new(DataNodeInfo {
            address: address.to_owned(),
            available_space,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.ok);
}

async fn allocate(
    handler: &MetaServiceHandler,
    filename: &str,
    chunk_index: i32,
    chunk_size: i64,
) -> Result<ChunkLocation, Status> {
    handler
        .allocate_chunk_location(Request::new(ChunkAllocationRequest {
            filename: filename.to_owned(),
            chunk_index,
            chunk_size,
        }))
        .await
        .map(|response| response.into_inner())
}

async fn locate(handler: &MetaServiceHandler, filename: &str) -> (bool, Vec<ChunkLocation>) {
    let response = handler
        .get_file_location(Request::new(FileLocationRequest {
            filename: filename.to_owned(),
        }))
        .await
        .unwrap()
        .into_inner();
    (response.found, response.chunks)
}

#[tokio::test]
async fn datanode_registration_is_acknowledged() {
    let handler = handler();
    register(&handler, "localhost:50052", 10 * GIB).await;
}

#[tokio::test]
async fn allocation_without_datanodes_is_resource_exhausted() {
    let handler = handler();
    let err = allocate(&handler, "x", 0, 1024).await.unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
}

#[tokio::test]
async fn allocation_assigns_a_registered_datanode() {
    let handler = handler();
    register(&handler, "localhost:50052", 10 * GIB).await;
    let location = allocate(&handler, "test.dat", 0, 1024).await.unwrap();
    assert!(!location.chunk_id.is_empty());
    assert_eq!(location.datanode_addresses, vec!["localhost:50052"]);
}

#[tokio::test]
async fn repeated_allocations_yield_unique_chunk_ids() {
    let handler = handler();
    register(&handler, "localhost:50052", 10 * GIB).await;
    let mut seen = std::collections::HashSet::new();
    for i in 0..20 {
        let location = allocate(&handler, "unique.dat", i, 1024).await.unwrap();
        assert!(seen.insert(location.chunk_id));
    }
}

#[tokio::test]
async fn lookup_of_unknown_file_is_not_found() {
    let handler = handler();
    let (found, chunks) = locate(&handler, "nonexistent.txt").await;
    assert!(!found);
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn lookup_returns_chunks_in_file_order() {
    let handler = handler();
    register(&handler, "localhost:50052", 10 * GIB).await;
    let mut expected = Vec::new();
    for i in 0..3 {
        expected.push(allocate(&handler, "ordered.dat", i, 1024).await.unwrap().chunk_id);
    }
    let (found, chunks) = locate(&handler, "ordered.dat").await;
    assert!(found);
    assert_eq!(
        chunks.iter().map(|c| c.chunk_id.clone()).collect::<Vec<_>>(),
        expected
    );
    for chunk in &chunks {
        assert_eq!(chunk.datanode_addresses, vec!["localhost:50052"]);
    }
}

#[tokio::test]
async fn load_balancing_prefers_the_largest_datanode() {
    let handler = handler();
    register(&handler, "localhost:50052", 5 * GIB).await;
    register(&handler, "localhost:50053", 10 * GIB).await;
    register(&handler, "localhost:50054", 3 * GIB).await;

    let mut allocations: std::collections::HashMap<String, usize> = Default::default();
    for i in 0..10 {
        let location = allocate(&handler, "balanced.bin", i, MIB).await.unwrap();
        *allocations.entry(location.datanode_addresses[0].clone()).or_default() += 1;
    }
    let best = allocations.get("localhost:50053").copied().unwrap_or(0);
    assert!(best > allocations.get("localhost:50052").copied().unwrap_or(0));
    assert!(best > allocations.get("localhost:50054").copied().unwrap_or(0));
}

#[tokio::test]
async fn empty_file_is_found_with_zero_chunks() {
    let handler = handler();
    register(&handler, "localhost:50052", 10 * GIB).await;
    let location = allocate(&handler, "empty.txt", 0, 0).await.unwrap();
    assert!(!location.chunk_id.is_empty());
    let (found, chunks) = locate(&handler, "empty.txt").await;
    assert!(found);
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn heartbeat_claims_widen_chunk_locations() {
    let handler = handler();
    register(&handler, "localhost:50052", 10 * GIB).await;
    let location = allocate(&handler, "wide.dat", 0, 1024).await.unwrap();

    let response = handler
        .heartbeat(Request::new(DataNodeHeartbeat {
            address: "localhost:50060".to_owned(),
            available_space: 10 * GIB,
            current_load: 0,
            stored_chunk_ids: vec![location.chunk_id.clone()],
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.ok);
    assert!(response.chunks_to_delete.is_empty());

    let (found, chunks) = locate(&handler, "wide.dat").await;
    assert!(found);
    let mut addresses = chunks[0].datanode_addresses.clone();
    addresses.sort();
    assert_eq!(addresses, vec!["localhost:50052", "localhost:50060"]);
}

#[tokio::test]
async fn inactive_datanodes_are_not_listed_as_locations() {
    let tracker = Arc::new(DataNodeTracker::with_liveness(
        Box::new(LeastLoadedPolicy),
        Duration::from_millis(40),
        Duration::from_millis(200),
    ));
    let handler = MetaServiceHandler::new(
        tracker,
        Arc::new(Namespace::new()),
        Arc::new(LocationCache::new(1000)),
    );
    register(&handler, "localhost:50052", 10 * GIB).await;
    allocate(&handler, "fading.dat", 0, 1024).await.unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    let (found, chunks) = locate(&handler, "fading.dat").await;
    assert!(found);
    assert!(chunks.is_empty());
    let err = allocate(&handler, "fading.dat", 1, 1024).await.unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
}
