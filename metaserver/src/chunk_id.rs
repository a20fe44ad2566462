use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

pub trait ChunkIdGenerator {
    fn next_id(&self, filename: &str, chunk_index: i32) -> String;
}

/// Produces `<filename-hash>_<index>_<counter>` ids. The counter alone
/// guarantees uniqueness within the process; the other two components make
/// ids self-documenting when debugging. The alphabet stays filesystem-safe
/// (decimal digits and underscores).
#[derive(Default)]
pub struct DefaultChunkIdGenerator {
    counter: AtomicU64,
}

impl ChunkIdGenerator for DefaultChunkIdGenerator {
    fn next_id(&self, filename: &str, chunk_index: i32) -> String {
        let mut hasher = DefaultHasher::new();
        filename.hash(&mut hasher);
        format!(
            "{}_{}_{}",
            hasher.finish(),
            chunk_index,
            self.counter.fetch_add(1, Ordering::SeqCst)
        )
    }
}
