use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use metaserver::cache::LocationCache;
use metaserver::config::CONFIG;
use metaserver::datanode_tracker::DataNodeTracker;
use metaserver::handler::MetaServiceHandler;
use metaserver::namespace::Namespace;
use metaserver::selection_policy::LeastLoadedPolicy;
use metaserver::state_maintainer::StateMaintainer;
use proto::generated::metaserver::meta_service_server::MetaServiceServer;
use tonic::transport::Server;
use utilities::logger::{info, init_logger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _guard = init_logger(
        "Metaserver",
        &CONFIG.listen_addr,
        &CONFIG.log_level,
        &CONFIG.log_base,
    );
    let addr = CONFIG.listen_addr.parse()?;

    let tracker = Arc::new(DataNodeTracker::new(Box::new(LeastLoadedPolicy)));
    let namespace = Arc::new(Namespace::new());
    let cache = Arc::new(LocationCache::new(CONFIG.cache_capacity));
    StateMaintainer::new(tracker.clone(), namespace.clone(), cache.clone())
        .start(Duration::from_secs(CONFIG.sweep_interval_secs));

    let handler = MetaServiceHandler::new(tracker, namespace, cache);
    info!(%addr, cache_capacity = CONFIG.cache_capacity, "Starting the metaserver grpc server");
    Server::builder()
        .add_service(MetaServiceServer::new(handler))
        .serve(addr)
        .await?;
    Ok(())
}
