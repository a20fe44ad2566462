use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use utilities::result::Result;

/// Files are partitioned into contiguous 1 MiB chunks with a final short
/// chunk.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Reads a local file sequentially, one chunk at a time.
pub struct FileChunker {
    reader: BufReader<File>,
}

impl FileChunker {
    pub async fn open(path: &str) -> Result<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| format!("Cannot open file {path}: {e}"))?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Returns the next chunk, or None at end of file.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let read = self.reader.read(&mut buffer[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled == 0 {
            return Ok(None);
        }
        buffer.truncate(filled);
        Ok(Some(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_files_on_the_chunk_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let payload = vec![7u8; CHUNK_SIZE + 10];
        std::fs::write(&path, &payload).unwrap();

        let mut chunker = FileChunker::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(chunker.next_chunk().await.unwrap().unwrap().len(), CHUNK_SIZE);
        assert_eq!(chunker.next_chunk().await.unwrap().unwrap(), vec![7u8; 10]);
        assert!(chunker.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_files_yield_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();
        let mut chunker = FileChunker::open(path.to_str().unwrap()).await.unwrap();
        assert!(chunker.next_chunk().await.unwrap().is_none());
    }
}
