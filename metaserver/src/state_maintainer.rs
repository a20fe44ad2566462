use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use utilities::logger::{info, span, trace, Level};

use crate::cache::LocationCache;
use crate::datanode_tracker::DataNodeTracker;
use crate::namespace::Namespace;

/// Periodically drops datanodes that stopped heartbeating and invalidates
/// the cached locations of every chunk they claimed.
pub struct StateMaintainer {
    tracker: Arc<DataNodeTracker>,
    namespace: Arc<Namespace>,
    cache: Arc<LocationCache>,
}

impl StateMaintainer {
    pub fn new(
        tracker: Arc<DataNodeTracker>,
        namespace: Arc<Namespace>,
        cache: Arc<LocationCache>,
    ) -> Self {
        Self {
            tracker,
            namespace,
            cache,
        }
    }

    pub fn start(self, period: Duration) {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let span = span!(Level::INFO, "metaserver_state_sweep");
                let _entered = span.enter();
                let expired = self.tracker.expire_stale();
                for record in &expired {
                    for chunk_id in &record.stored_chunks {
                        self.cache.remove(chunk_id);
                    }
                }
                if !expired.is_empty() {
                    info!(expired = expired.len(), "Expired stale datanodes");
                }
                trace!(
                    datanodes = self.tracker.node_count(),
                    files = self.namespace.file_count(),
                    "Sweep finished"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::ChunkLocationInfo;
    use crate::selection_policy::LeastLoadedPolicy;

    #[tokio::test]
    async fn sweep_expires_nodes_and_invalidates_cache() {
        let tracker = Arc::new(DataNodeTracker::with_liveness(
            Box::new(LeastLoadedPolicy),
            Duration::from_millis(20),
            Duration::from_millis(40),
        ));
        let namespace = Arc::new(Namespace::new());
        let cache = Arc::new(LocationCache::new(10));

        tracker.heartbeat("node1", vec!["1_0_0".to_owned()], 4096, 0);
        cache.put(
            "1_0_0",
            ChunkLocationInfo {
                chunk_id: "1_0_0".to_owned(),
                datanode_addresses: vec!["node1".to_owned()],
            },
        );

        StateMaintainer::new(tracker.clone(), namespace, cache.clone())
            .start(Duration::from_millis(25));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(tracker.node_count(), 0);
        assert!(cache.get("1_0_0").is_none());
    }
}
