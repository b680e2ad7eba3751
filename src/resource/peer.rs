use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{ByteRange, ByteRangeResource};
use crate::channel::{ChannelMessage, DataChannel, PeerLink};
use crate::config::PeerConfig;
use crate::error::{EdfError, Result};
use crate::transfer::ChunkTransfer;

/// Control message sent as text on a per-request channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerRequest {
    Read { from: u64, till: u64 },
}

/// A file held by a remote peer, read one channel per request
pub struct PeerResource {
    link: Arc<dyn PeerLink>,
    size: u64,
    name: String,
    config: PeerConfig,
    transfer: ChunkTransfer,
    next_id: AtomicU64,
}

impl PeerResource {
    /// `size` and `name` describe the remote file and come from the session setup
    pub fn new(link: Arc<dyn PeerLink>, size: u64, name: impl Into<String>) -> Self {
        Self::with_config(link, size, name, PeerConfig::default())
    }

    pub fn with_config(link: Arc<dyn PeerLink>, size: u64, name: impl Into<String>, config: PeerConfig) -> Self {
        PeerResource {
            link,
            size,
            name: name.into(),
            transfer: ChunkTransfer::new(config.transfer.clone()),
            config,
            next_id: AtomicU64::new(0),
        }
    }

    async fn wait_open(&self, channel: &dyn DataChannel) -> Result<()> {
        match self.config.open_timeout {
            Some(timeout) => tokio::time::timeout(timeout, channel.opened())
                .await
                .map_err(|_| EdfError::ChannelNotOpen(channel.label().to_string()))?,
            None => channel.opened().await,
        }
    }
}

#[async_trait]
impl ByteRangeResource for PeerResource {
    async fn read_bytes(&self, range: ByteRange) -> Result<Bytes> {
        let (from, till) = range.resolve(Some(self.size));
        let till = till.unwrap_or(self.size);
        if till <= from {
            return Ok(Bytes::new());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let label = format!("{}-{}", self.config.channel_prefix, id);
        let channel = self.link.data_channel(&label).await?;
        self.wait_open(&*channel).await?;

        let request = serde_json::to_string(&PeerRequest::Read { from, till })?;
        debug!("{} request {}", label, request);
        channel.send(ChannelMessage::Text(request)).await?;

        self.transfer.receive(&*channel, (till - from) as usize).await
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Length-preserving rewrite applied to outgoing bytes; gets the range start
pub type Rewrite = Arc<dyn Fn(u64, &mut [u8]) + Send + Sync>;

/// Serves read requests for one resource to a remote [`PeerResource`]
pub struct PeerFileServer {
    resource: Arc<dyn ByteRangeResource>,
    transfer: ChunkTransfer,
    rewrite: Option<Rewrite>,
}

impl PeerFileServer {
    pub fn new(resource: Arc<dyn ByteRangeResource>, config: PeerConfig) -> Self {
        PeerFileServer {
            resource,
            transfer: ChunkTransfer::new(config.transfer),
            rewrite: None,
        }
    }

    /// Rewrites bytes in transit, e.g. to blank identifying header fields
    pub fn with_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// Answers channels from `link` until the link goes away
    pub async fn serve(self: Arc<Self>, link: Arc<dyn PeerLink>) {
        info!("serving {} to peer", self.resource.name());
        while let Some(channel) = link.accept().await {
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle(channel.clone()).await {
                    warn!("{} failed: {}", channel.label(), e);
                }
            });
        }
        debug!("peer link closed");
    }

    /// Answers every read request arriving on `channel`
    pub async fn handle(&self, channel: Arc<dyn DataChannel>) -> Result<()> {
        while let Some(message) = channel.recv().await {
            let text = match message {
                ChannelMessage::Text(text) => text,
                ChannelMessage::Binary(bytes) => {
                    warn!("{} ignoring {} unexpected binary bytes", channel.label(), bytes.len());
                    continue;
                }
            };

            let PeerRequest::Read { from, till } = serde_json::from_str(&text)?;
            let mut bytes = self.resource.read_bytes(ByteRange::new(from, till)).await?;

            if let Some(rewrite) = &self.rewrite {
                let mut owned = BytesMut::from(&bytes[..]);
                rewrite(from, &mut owned[..]);
                bytes = owned.freeze();
            }

            self.transfer.send(&*channel, &bytes).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&PeerRequest::Read { from: 0, till: 256 }).unwrap();
        assert_eq!(json, r#"{"type":"read","from":0,"till":256}"#);

        let parsed: PeerRequest = serde_json::from_str(r#"{"till":10,"from":2,"type":"read"}"#).unwrap();
        assert_eq!(parsed, PeerRequest::Read { from: 2, till: 10 });
    }
}
