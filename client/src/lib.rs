pub mod dfs_client;
pub mod file_chunker;
