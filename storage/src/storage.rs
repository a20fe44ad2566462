use crate::error::Result;

pub trait Storage {
    async fn store_chunk(&self, chunk_id: &str, data: &[u8]) -> Result<()>;
    async fn read_chunk(&self, chunk_id: &str) -> Result<Vec<u8>>;
    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool>;
    async fn has_chunk(&self, chunk_id: &str) -> bool;
    async fn stored_chunk_ids(&self) -> Vec<String>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub async fn storage_test(storage: impl Storage) -> Result<()> {
        let chunk_id = "4242_0_0";
        let original_data = b"hello world";

        storage.store_chunk(chunk_id, original_data).await?;
        let available_chunks = storage.stored_chunk_ids().await;
        assert_eq!(available_chunks, vec![chunk_id.to_owned()]);
        assert!(storage.has_chunk(chunk_id).await);

        let read_back = storage.read_chunk(chunk_id).await?;
        assert_eq!(read_back, original_data);

        assert!(storage.delete_chunk(chunk_id).await?);
        assert!(!storage.delete_chunk(chunk_id).await?);
        assert!(storage.stored_chunk_ids().await.is_empty());
        Ok(())
    }
}
