//! Chunked binary transfer over an ordered, reliable [`DataChannel`]
//!
//! The payload is cut into fixed-size binary messages. The receiver learns
//! the total size out of band (from the request that started the transfer)
//! and reassembles the chunks in arrival order; nothing in the stream names
//! a chunk's position.

use bytes::Bytes;
use log::{debug, trace};

use crate::channel::{ChannelMessage, DataChannel};
use crate::config::TransferConfig;
use crate::error::{EdfError, Result};

#[derive(Debug, Clone, Default)]
pub struct ChunkTransfer {
    config: TransferConfig,
}

impl ChunkTransfer {
    pub fn new(config: TransferConfig) -> Self {
        ChunkTransfer { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Sends `buffer` as consecutive chunks and returns how many were sent
    ///
    /// After each chunk, sending pauses while the channel holds more than the
    /// low watermark, so the channel queue stays bounded by roughly
    /// `low_watermark + chunk_size` bytes.
    pub async fn send(&self, channel: &dyn DataChannel, buffer: &Bytes) -> Result<usize> {
        let chunk_size = self.config.chunk_size.max(1);
        let low_watermark = self.config.low_watermark();
        let mut chunks = 0;
        let mut start = 0;

        while start < buffer.len() {
            let end = (start + chunk_size).min(buffer.len());
            channel.send(ChannelMessage::Binary(buffer.slice(start..end))).await?;
            chunks += 1;
            start = end;

            if channel.buffered_amount() > low_watermark {
                trace!("{} backpressure at {} bytes", channel.label(), channel.buffered_amount());
                channel.buffered_amount_low(low_watermark).await;
            }
        }

        debug!("{} sent {} bytes in {} chunks", channel.label(), buffer.len(), chunks);
        Ok(chunks)
    }

    /// Collects exactly `expected_size` bytes from `channel`
    pub async fn receive(&self, channel: &dyn DataChannel, expected_size: usize) -> Result<Bytes> {
        let mut buffer = vec![0u8; expected_size];
        let mut received = 0;

        while received < expected_size {
            let message = channel.recv().await.ok_or_else(|| {
                EdfError::transport(format!(
                    "{} closed after {} of {} bytes",
                    channel.label(),
                    received,
                    expected_size
                ))
            })?;

            let chunk = match message {
                ChannelMessage::Binary(chunk) => chunk,
                ChannelMessage::Text(_) => {
                    return Err(EdfError::transport(format!(
                        "{} sent a text message during a binary transfer",
                        channel.label()
                    )))
                }
            };

            if received + chunk.len() > expected_size {
                return Err(EdfError::OverflowError {
                    expected: expected_size,
                    received: received + chunk.len(),
                });
            }
            buffer[received..received + chunk.len()].copy_from_slice(&chunk);
            received += chunk.len();
        }

        Ok(Bytes::from(buffer))
    }
}
