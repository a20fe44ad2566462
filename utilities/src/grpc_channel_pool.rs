use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::{trace, Instrument, Span};

use crate::result::Result;
use crate::retry_policy::retry_with_backoff;

#[derive(Clone, Debug)]
pub struct GrpcChannelPool {
    store: Arc<Mutex<HashMap<String, Channel>>>,
}
impl GrpcChannelPool {
    fn new() -> Self {
        Self {
            store: Arc::default(),
        }
    }
    pub async fn get_channel(&self, addrs: &str) -> Result<Channel> {
        if let Some(chnl) = self.store.lock().await.get(addrs) {
            trace!("Channel already present");
            return Ok(chnl.clone());
        }
        trace!("Creating endpoint for channel since channel is not present already");
        // worker addresses travel as bare host:port
        let uri = if addrs.contains("://") {
            addrs.to_owned()
        } else {
            format!("http://{addrs}")
        };
        let endpoint = Endpoint::from_str(&uri)
            .map_err(|e| format!("Error while creating an endpoint {e} for location {addrs}"))?
            .connect_timeout(Duration::from_secs(5));

        let chnl = retry_with_backoff(
            || {
                let endpoint = endpoint.clone();
                async move {
                    endpoint
                        .connect()
                        .await
                        .map_err(|e| format!("Error while connecting to address {e:?}").into())
                }
                .instrument(Span::current())
            },
            3,
        )
        .await?;
        self.store
            .lock()
            .await
            .insert(addrs.to_owned(), chnl.clone());
        Ok(chnl)
    }
}

pub static GRPC_CHANNEL_POOL: once_cell::sync::Lazy<GrpcChannelPool> =
    once_cell::sync::Lazy::new(GrpcChannelPool::new);
