//! Datanode liveness tracking and chunk placement.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use utilities::logger::{debug, info};

use crate::selection_policy::SelectionPolicy;

/// A datanode is eligible for placement and lookups while its last heartbeat
/// is at most this old.
pub const ACTIVE_MAX: Duration = Duration::from_secs(30);
/// Past this, the record is dropped entirely. In between, the record is kept
/// so a resumed heartbeat restores the node without re-registration.
pub const STALE_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DataNodeRecord {
    pub address: String,
    pub available_space: i64,
    pub current_load: i32,
    pub stored_chunks: HashSet<String>,
    pub last_heartbeat: Instant,
}

impl DataNodeRecord {
    fn new(address: &str, available_space: i64) -> Self {
        Self {
            address: address.to_owned(),
            available_space,
            current_load: 0,
            stored_chunks: HashSet::new(),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn is_active(&self, active_max: Duration) -> bool {
        self.last_heartbeat.elapsed() <= active_max
    }
}

pub struct DataNodeTracker {
    nodes: Mutex<HashMap<String, DataNodeRecord>>,
    policy: Box<dyn SelectionPolicy>,
    active_max: Duration,
    stale_max: Duration,
}

impl DataNodeTracker {
    pub fn new(policy: Box<dyn SelectionPolicy>) -> Self {
        Self::with_liveness(policy, ACTIVE_MAX, STALE_MAX)
    }

    pub fn with_liveness(
        policy: Box<dyn SelectionPolicy>,
        active_max: Duration,
        stale_max: Duration,
    ) -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            policy,
            active_max,
            stale_max,
        }
    }

    /// Re-registration overwrites the existing record unconditionally.
    pub fn register(&self, address: &str, available_space: i64) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(address.to_owned(), DataNodeRecord::new(address, available_space));
        info!(%address, available_space, "Registered datanode");
    }

    /// Replaces the node's reported state and stamps the heartbeat time;
    /// unknown addresses are auto-registered.
    pub fn heartbeat(
        &self,
        address: &str,
        stored_chunks: Vec<String>,
        available_space: i64,
        current_load: i32,
    ) {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get_mut(address) {
            Some(record) => {
                record.available_space = available_space;
                record.current_load = current_load;
                record.stored_chunks = stored_chunks.into_iter().collect();
                record.last_heartbeat = Instant::now();
            }
            None => {
                info!(%address, "Auto-registering datanode from heartbeat");
                let mut record = DataNodeRecord::new(address, available_space);
                record.current_load = current_load;
                record.stored_chunks = stored_chunks.into_iter().collect();
                nodes.insert(address.to_owned(), record);
            }
        }
    }

    pub fn remove(&self, address: &str) {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.remove(address).is_some() {
            info!(%address, "Removed datanode");
        }
    }

    pub fn record(&self, address: &str) -> Option<DataNodeRecord> {
        self.nodes.lock().unwrap().get(address).cloned()
    }

    pub fn active_addresses(&self) -> Vec<String> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .values()
            .filter(|record| record.is_active(self.active_max))
            .map(|record| record.address.clone())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }

    /// Drops every record whose heartbeat is older than the stale window and
    /// returns them so callers can invalidate dependent state.
    pub fn expire_stale(&self) -> Vec<DataNodeRecord> {
        let mut nodes = self.nodes.lock().unwrap();
        Self::drop_stale(&mut nodes, self.stale_max)
    }

    fn drop_stale(
        nodes: &mut HashMap<String, DataNodeRecord>,
        stale_max: Duration,
    ) -> Vec<DataNodeRecord> {
        let stale: Vec<String> = nodes
            .iter()
            .filter(|(_, record)| record.last_heartbeat.elapsed() > stale_max)
            .map(|(address, _)| address.clone())
            .collect();
        stale
            .iter()
            .filter_map(|address| {
                info!(%address, "Removing stale datanode");
                nodes.remove(address)
            })
            .collect()
    }

    /// Placement for one chunk: lazily expires stale records, filters to
    /// active nodes with room for the chunk, lets the policy pick one, and
    /// speculatively charges the choice with the chunk size and one unit of
    /// load. The next heartbeat resynchronizes both fields.
    pub fn select_for_chunk(&self, chunk_size: i64) -> Option<String> {
        let mut nodes = self.nodes.lock().unwrap();
        Self::drop_stale(&mut nodes, self.stale_max);
        let candidates: Vec<&DataNodeRecord> = nodes
            .values()
            .filter(|record| {
                record.is_active(self.active_max) && record.available_space >= chunk_size
            })
            .collect();
        let chosen = self.policy.pick(&candidates)?.address.clone();
        let record = nodes.get_mut(&chosen)?;
        record.available_space -= chunk_size;
        record.current_load += 1;
        debug!(address = %chosen, chunk_size, "Selected datanode for chunk");
        Some(chosen)
    }
}
