//! File → chunk and chunk → holder bookkeeping.
//!
//! Lock order across the coordinator is workers → files → chunks → cache;
//! this module only ever takes the files lock before the chunks lock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub filename: String,
    // index = position in the file; an empty string marks an unallocated slot
    pub chunk_ids: Vec<String>,
    pub total_size: i64,
    pub created_at: SystemTime,
}

#[derive(Default)]
pub struct Namespace {
    files: Mutex<HashMap<String, FileMetadata>>,
    chunk_holders: Mutex<HashMap<String, HashSet<String>>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the file descriptor for a fresh allocation and reserves the
    /// chunk for the selected datanode. A zero-size allocation only touches
    /// the descriptor: the slot keeps its empty-string sentinel and no
    /// holder entry is made, so lookups skip it.
    pub fn record_allocation(
        &self,
        filename: &str,
        chunk_index: usize,
        chunk_id: &str,
        chunk_size: i64,
        address: &str,
    ) {
        {
            let mut files = self.files.lock().unwrap();
            let file = files
                .entry(filename.to_owned())
                .or_insert_with(|| FileMetadata {
                    filename: filename.to_owned(),
                    chunk_ids: Vec::new(),
                    total_size: 0,
                    created_at: SystemTime::now(),
                });
            if file.chunk_ids.len() <= chunk_index {
                file.chunk_ids.resize(chunk_index + 1, String::new());
            }
            if chunk_size > 0 {
                file.chunk_ids[chunk_index] = chunk_id.to_owned();
            }
            file.total_size += chunk_size;
            if chunk_index == 0 {
                file.created_at = SystemTime::now();
            }
        }
        if chunk_size > 0 {
            self.record_holder(chunk_id, address);
        }
    }

    /// Adds a datanode to a chunk's holder set. Heartbeats are the
    /// authoritative claim and only ever widen the set.
    pub fn record_holder(&self, chunk_id: &str, address: &str) {
        self.chunk_holders
            .lock()
            .unwrap()
            .entry(chunk_id.to_owned())
            .or_default()
            .insert(address.to_owned());
    }

    pub fn chunk_ids_of(&self, filename: &str) -> Option<Vec<String>> {
        self.files
            .lock()
            .unwrap()
            .get(filename)
            .map(|file| file.chunk_ids.clone())
    }

    pub fn holders_of(&self, chunk_id: &str) -> Vec<String> {
        self.chunk_holders
            .lock()
            .unwrap()
            .get(chunk_id)
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn file_metadata(&self, filename: &str) -> Option<FileMetadata> {
        self.files.lock().unwrap().get(filename).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}
