use std::path::Path;

use proto::generated::datanode::data_node_service_client::DataNodeServiceClient;
use proto::generated::datanode::{ChunkData, ChunkRequest};
use proto::generated::metaserver::meta_service_client::MetaServiceClient;
use proto::generated::metaserver::{ChunkAllocationRequest, ChunkLocation, FileLocationRequest};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tonic::transport::Channel;
use utilities::grpc_channel_pool::GRPC_CHANNEL_POOL;
use utilities::logger::{info, instrument, warn};
use utilities::result::Result;

use crate::file_chunker::FileChunker;

pub struct DfsClient {
    metaserver: MetaServiceClient<Channel>,
}

impl DfsClient {
    pub async fn connect(metaserver_addr: &str) -> Result<Self> {
        let channel = GRPC_CHANNEL_POOL.get_channel(metaserver_addr).await?;
        Ok(Self {
            metaserver: MetaServiceClient::new(channel),
        })
    }

    async fn datanode_client(address: &str) -> Result<DataNodeServiceClient<Channel>> {
        let channel = GRPC_CHANNEL_POOL.get_channel(address).await?;
        Ok(DataNodeServiceClient::new(channel))
    }

    /// Uploads a local file under its basename: every chunk is allocated at
    /// the metaserver, then pushed to the first listed datanode that takes
    /// it. An empty file is registered as chunk 0 with size 0.
    #[instrument(skip(self))]
    pub async fn upload_file(&mut self, local_path: &str) -> Result<()> {
        let file_name = Path::new(local_path)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format!("Invalid file name: {local_path}"))?
            .to_owned();
        let mut chunker = FileChunker::open(local_path).await?;
        let mut chunk_index: i32 = 0;
        while let Some(chunk) = chunker.next_chunk().await? {
            self.upload_chunk(&file_name, chunk_index, &chunk).await?;
            chunk_index += 1;
        }
        if chunk_index == 0 {
            let request = ChunkAllocationRequest {
                filename: file_name.clone(),
                chunk_index: 0,
                chunk_size: 0,
            };
            self.metaserver
                .allocate_chunk_location(tonic::Request::new(request))
                .await
                .map_err(|e| format!("Failed to register empty file: {e}"))?;
        }
        info!(%file_name, chunks = chunk_index, "Upload completed");
        Ok(())
    }

    async fn upload_chunk(&mut self, file_name: &str, chunk_index: i32, data: &[u8]) -> Result<()> {
        let request = ChunkAllocationRequest {
            filename: file_name.to_owned(),
            chunk_index,
            chunk_size: data.len() as i64,
        };
        let location = self
            .metaserver
            .allocate_chunk_location(tonic::Request::new(request))
            .await
            .map_err(|e| format!("Failed to allocate chunk {chunk_index}: {e}"))?
            .into_inner();
        if location.datanode_addresses.is_empty() {
            return Err(format!("No datanode assigned for chunk {chunk_index}").into());
        }
        for address in &location.datanode_addresses {
            let mut client = match Self::datanode_client(address).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(%address, error = %e, "Failed to reach datanode");
                    continue;
                }
            };
            let chunk = ChunkData {
                chunk_id: location.chunk_id.clone(),
                data: data.to_vec(),
            };
            match client.store_chunk(tonic::Request::new(chunk)).await {
                Ok(response) if response.get_ref().ok => return Ok(()),
                Ok(response) => {
                    warn!(%address, message = %response.get_ref().message, "Datanode rejected chunk")
                }
                Err(status) => {
                    warn!(%address, error = %status, "Failed to store chunk on datanode")
                }
            }
        }
        Err(format!("Could not store chunk {} to any datanode", location.chunk_id).into())
    }

    /// Downloads `file_name` into `output_path`, pulling each chunk from any
    /// listed datanode. A chunk with no reachable datanode fails the whole
    /// download and removes the partial output file.
    #[instrument(skip(self))]
    pub async fn download_file(&mut self, file_name: &str, output_path: &str) -> Result<()> {
        let request = FileLocationRequest {
            filename: file_name.to_owned(),
        };
        let response = self
            .metaserver
            .get_file_location(tonic::Request::new(request))
            .await
            .map_err(|e| format!("Failed to get file location: {e}"))?
            .into_inner();
        if !response.found {
            return Err(format!("File not found: {file_name}").into());
        }
        let mut output = File::create(output_path)
            .await
            .map_err(|e| format!("Cannot create output file {output_path}: {e}"))?;
        for chunk_location in &response.chunks {
            match self.fetch_chunk(chunk_location).await {
                Ok(data) => output.write_all(&data).await?,
                Err(e) => {
                    drop(output);
                    let _ = tokio::fs::remove_file(output_path).await;
                    return Err(e);
                }
            }
        }
        output.flush().await?;
        info!(%file_name, chunks = response.chunks.len(), "Download completed");
        Ok(())
    }

    async fn fetch_chunk(&self, location: &ChunkLocation) -> Result<Vec<u8>> {
        for address in &location.datanode_addresses {
            let mut client = match Self::datanode_client(address).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(%address, error = %e, "Failed to reach datanode");
                    continue;
                }
            };
            let request = ChunkRequest {
                chunk_id: location.chunk_id.clone(),
            };
            match client.read_chunk(tonic::Request::new(request)).await {
                Ok(response) => return Ok(response.into_inner().data),
                Err(status) => {
                    warn!(%address, error = %status, "Failed to retrieve chunk from datanode")
                }
            }
        }
        Err(format!("Could not retrieve chunk {} from any datanode", location.chunk_id).into())
    }
}
