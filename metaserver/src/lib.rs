pub mod cache;
pub mod chunk_id;
pub mod config;
pub mod datanode_tracker;
pub mod handler;
pub mod namespace;
pub mod selection_policy;
pub mod state_maintainer;
