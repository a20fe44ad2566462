use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("insufficient storage space: chunk needs {requested} bytes, {available} free")]
    CapacityExceeded { requested: i64, available: i64 },

    #[error("chunk not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for chunk {chunk_id}")]
    ChecksumMismatch { chunk_id: String },
}
