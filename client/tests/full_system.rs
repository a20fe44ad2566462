//! End-to-end coverage: a metaserver and datanodes wired together over real
//! gRPC on ephemeral ports, driven through the client library.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client::dfs_client::DfsClient;
use datanode::handler::ClientHandler;
use datanode::metaserver_service::MetaserverService;
use metaserver::cache::LocationCache;
use metaserver::datanode_tracker::DataNodeTracker;
use metaserver::handler::MetaServiceHandler;
use metaserver::namespace::Namespace;
use metaserver::selection_policy::LeastLoadedPolicy;
use proto::generated::datanode::data_node_service_server::DataNodeServiceServer;
use proto::generated::metaserver::meta_service_client::MetaServiceClient;
use proto::generated::metaserver::meta_service_server::MetaServiceServer;
use proto::generated::metaserver::FileLocationRequest;
use rand::RngCore;
use storage::chunk_store::ChunkStore;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

const TEST_CAPACITY: i64 = 10 * 1024 * 1024 * 1024;
const TEST_HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);
// short activity window so a stopped datanode drops out of lookups quickly
const TEST_ACTIVE_MAX: Duration = Duration::from_millis(500);

async fn spawn_metaserver() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tracker = Arc::new(DataNodeTracker::with_liveness(
        Box::new(LeastLoadedPolicy),
        TEST_ACTIVE_MAX,
        Duration::from_secs(60),
    ));
    let handler = MetaServiceHandler::new(
        tracker,
        Arc::new(Namespace::new()),
        Arc::new(LocationCache::new(1000)),
    );
    tokio::spawn(async move {
        Server::builder()
            .add_service(MetaServiceServer::new(handler))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

struct TestDataNode {
    shutdown: Arc<AtomicBool>,
    server: tokio::task::JoinHandle<()>,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl TestDataNode {
    fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.heartbeat.abort();
        self.server.abort();
    }
}

async fn spawn_datanode(metaserver_addr: SocketAddr, storage_path: &Path) -> TestDataNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = ChunkStore::open(storage_path, TEST_CAPACITY).await.unwrap();
    let shutdown = Arc::new(AtomicBool::new(false));
    let heartbeat = MetaserverService::new(
        store.clone(),
        addr.to_string(),
        format!("http://{metaserver_addr}"),
    )
    .start_heartbeat_loop(TEST_HEARTBEAT_PERIOD, shutdown.clone());
    let server = tokio::spawn(async move {
        Server::builder()
            .add_service(DataNodeServiceServer::new(ClientHandler::new(store)))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    // give registration and the first heartbeat time to land
    sleep(Duration::from_millis(300)).await;
    TestDataNode {
        shutdown,
        server,
        heartbeat,
    }
}

fn count_chunk_files(root: &Path) -> usize {
    let mut count = 0;
    for subdir in std::fs::read_dir(root).unwrap().flatten() {
        if !subdir.file_type().unwrap().is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(subdir.path()).unwrap().flatten() {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("chunk") {
                count += 1;
            }
        }
    }
    count
}

#[tokio::test(flavor = "multi_thread")]
async fn small_file_upload_download() {
    let metaserver_addr = spawn_metaserver().await;
    let storage_dir = tempfile::tempdir().unwrap();
    let node = spawn_datanode(metaserver_addr, storage_dir.path()).await;

    let work_dir = tempfile::tempdir().unwrap();
    let local_path = work_dir.path().join("hello.txt");
    std::fs::write(&local_path, b"Hello MiniDFS!").unwrap();

    let mut client = DfsClient::connect(&metaserver_addr.to_string()).await.unwrap();
    client.upload_file(local_path.to_str().unwrap()).await.unwrap();
    assert_eq!(count_chunk_files(storage_dir.path()), 1);

    let download_path = work_dir.path().join("hello.txt.downloaded");
    client
        .download_file("hello.txt", download_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&download_path).unwrap(), b"Hello MiniDFS!");
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn multi_chunk_file_roundtrips() {
    let metaserver_addr = spawn_metaserver().await;
    let storage_dir = tempfile::tempdir().unwrap();
    let node = spawn_datanode(metaserver_addr, storage_dir.path()).await;

    let mut payload = vec![0u8; 3 * 1024 * 1024];
    rand::thread_rng().fill_bytes(&mut payload);
    let work_dir = tempfile::tempdir().unwrap();
    let local_path = work_dir.path().join("large.bin");
    std::fs::write(&local_path, &payload).unwrap();

    let mut client = DfsClient::connect(&metaserver_addr.to_string()).await.unwrap();
    client.upload_file(local_path.to_str().unwrap()).await.unwrap();
    assert_eq!(count_chunk_files(storage_dir.path()), 3);

    let download_path = work_dir.path().join("large.bin.downloaded");
    client
        .download_file("large.bin", download_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&download_path).unwrap(), payload);
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_file_roundtrips() {
    let metaserver_addr = spawn_metaserver().await;
    let storage_dir = tempfile::tempdir().unwrap();
    let node = spawn_datanode(metaserver_addr, storage_dir.path()).await;

    let work_dir = tempfile::tempdir().unwrap();
    let local_path = work_dir.path().join("empty.txt");
    std::fs::write(&local_path, b"").unwrap();

    let mut client = DfsClient::connect(&metaserver_addr.to_string()).await.unwrap();
    client.upload_file(local_path.to_str().unwrap()).await.unwrap();

    let mut meta_client = MetaServiceClient::connect(format!("http://{metaserver_addr}"))
        .await
        .unwrap();
    let response = meta_client
        .get_file_location(tonic::Request::new(FileLocationRequest {
            filename: "empty.txt".to_owned(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.found);
    assert!(response.chunks.is_empty());

    let download_path = work_dir.path().join("empty.txt.downloaded");
    client
        .download_file("empty.txt", download_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(std::fs::metadata(&download_path).unwrap().len(), 0);
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn nonexistent_file_download_fails_cleanly() {
    let metaserver_addr = spawn_metaserver().await;
    let storage_dir = tempfile::tempdir().unwrap();
    let node = spawn_datanode(metaserver_addr, storage_dir.path()).await;

    let work_dir = tempfile::tempdir().unwrap();
    let download_path = work_dir.path().join("ghost.txt");
    let mut client = DfsClient::connect(&metaserver_addr.to_string()).await.unwrap();
    let err = client
        .download_file("ghost.txt", download_path.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("File not found"));
    assert!(!download_path.exists());
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn datanode_restart_preserves_data() {
    let metaserver_addr = spawn_metaserver().await;
    let storage_dir = tempfile::tempdir().unwrap();
    let node = spawn_datanode(metaserver_addr, storage_dir.path()).await;

    let mut payload = vec![0u8; 2 * 1024 * 1024];
    rand::thread_rng().fill_bytes(&mut payload);
    let work_dir = tempfile::tempdir().unwrap();
    let local_path = work_dir.path().join("durable.bin");
    std::fs::write(&local_path, &payload).unwrap();

    let mut client = DfsClient::connect(&metaserver_addr.to_string()).await.unwrap();
    client.upload_file(local_path.to_str().unwrap()).await.unwrap();

    node.stop();
    // let the stopped node fall out of the activity window
    sleep(TEST_ACTIVE_MAX + Duration::from_millis(200)).await;

    // a restarted datanode on the same storage path re-announces its chunks
    let restarted = spawn_datanode(metaserver_addr, storage_dir.path()).await;
    sleep(Duration::from_millis(300)).await;

    let download_path = work_dir.path().join("durable.bin.downloaded");
    client
        .download_file("durable.bin", download_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&download_path).unwrap(), payload);
    restarted.stop();
}
