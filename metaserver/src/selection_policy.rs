use crate::datanode_tracker::DataNodeRecord;

/// Seam for the placement decision. Candidates are already filtered to
/// active datanodes with enough free space for the chunk.
pub trait SelectionPolicy: Send + Sync {
    fn pick<'a>(&self, candidates: &[&'a DataNodeRecord]) -> Option<&'a DataNodeRecord>;
}

/// Default policy: minimum load, ties broken by maximum free space.
pub struct LeastLoadedPolicy;

impl SelectionPolicy for LeastLoadedPolicy {
    fn pick<'a>(&self, candidates: &[&'a DataNodeRecord]) -> Option<&'a DataNodeRecord> {
        candidates.iter().copied().min_by(|a, b| {
            a.current_load
                .cmp(&b.current_load)
                .then(b.available_space.cmp(&a.available_space))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Instant;

    use super::*;

    fn record(address: &str, available_space: i64, current_load: i32) -> DataNodeRecord {
        DataNodeRecord {
            address: address.to_owned(),
            available_space,
            current_load,
            stored_chunks: HashSet::new(),
            last_heartbeat: Instant::now(),
        }
    }

    #[test]
    fn picks_lowest_load() {
        let a = record("a", 100, 3);
        let b = record("b", 50, 1);
        let chosen = LeastLoadedPolicy.pick(&[&a, &b]).unwrap();
        assert_eq!(chosen.address, "b");
    }

    #[test]
    fn ties_break_on_free_space() {
        let a = record("a", 100, 2);
        let b = record("b", 500, 2);
        let c = record("c", 50, 2);
        let chosen = LeastLoadedPolicy.pick(&[&a, &b, &c]).unwrap();
        assert_eq!(chosen.address, "b");
    }

    #[test]
    fn no_candidates_means_no_choice() {
        assert!(LeastLoadedPolicy.pick(&[]).is_none());
    }
}
