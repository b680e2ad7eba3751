use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edfstream::channel::{ChannelMessage, ChannelState, DataChannel, MemoryChannel};
use edfstream::transfer::ChunkTransfer;
use edfstream::TransferConfig;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pattern(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<u8>>())
}

/// 记录发送后通道积压的最大字节数
struct Probe {
    inner: MemoryChannel,
    peak: AtomicUsize,
}

#[async_trait]
impl DataChannel for Probe {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn state(&self) -> ChannelState {
        self.inner.state()
    }

    async fn opened(&self) -> edfstream::Result<()> {
        self.inner.opened().await
    }

    fn buffered_amount(&self) -> usize {
        self.inner.buffered_amount()
    }

    async fn buffered_amount_low(&self, threshold: usize) {
        self.inner.buffered_amount_low(threshold).await
    }

    async fn send(&self, message: ChannelMessage) -> edfstream::Result<()> {
        self.inner.send(message).await?;
        self.peak.fetch_max(self.inner.buffered_amount(), Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&self) -> Option<ChannelMessage> {
        self.inner.recv().await
    }
}

#[tokio::test]
async fn test_chunk_count_and_identity() {
    init_logger();
    let transfer = ChunkTransfer::default();
    let chunk = transfer.config().chunk_size;
    assert_eq!(chunk, 16384);

    for (n, r) in [(0, 1), (1, 0), (3, 77), (20, 16383)] {
        let payload = pattern(n * chunk + r);
        let (tx, rx) = MemoryChannel::pair("edf-1");

        let receiver = {
            let expected = payload.len();
            tokio::spawn(async move { ChunkTransfer::default().receive(&rx, expected).await })
        };

        let sent = transfer.send(&tx, &payload).await.unwrap();
        let expected_chunks = if r == 0 { n } else { n + 1 };
        assert_eq!(sent, expected_chunks, "{} x chunk + {}", n, r);

        let received = receiver.await.unwrap().unwrap();
        assert_eq!(received, payload);
    }
}

#[tokio::test]
async fn test_send_queue_stays_bounded() {
    init_logger();
    let config = TransferConfig { chunk_size: 1024, low_watermark_chunks: 4 };
    let transfer = ChunkTransfer::new(config.clone());
    let (tx, rx) = MemoryChannel::pair("edf-2");
    let tx = Probe { inner: tx, peak: AtomicUsize::new(0) };

    let payload = pattern(200 * 1024 + 10);
    let receiver = {
        let expected = payload.len();
        tokio::spawn(async move {
            let mut received = Vec::with_capacity(expected);
            while received.len() < expected {
                match rx.recv().await {
                    Some(ChannelMessage::Binary(chunk)) => received.extend_from_slice(&chunk),
                    other => panic!("unexpected message {:?}", other),
                }
                // 慢速接收方
                tokio::time::sleep(Duration::from_micros(200)).await;
            }
            received
        })
    };

    let sent = transfer.send(&tx, &payload).await.unwrap();
    assert_eq!(sent, 201);

    let received = receiver.await.unwrap();
    assert_eq!(&received[..], &payload[..]);

    let peak = tx.peak.load(Ordering::SeqCst);
    assert!(peak > config.low_watermark(), "receiver never fell behind: {}", peak);
    assert!(
        peak <= config.low_watermark() + config.chunk_size,
        "queue grew to {} bytes",
        peak
    );
}

#[tokio::test]
async fn test_receive_after_sender_gone() {
    let (tx, rx) = MemoryChannel::pair("edf-3");
    let tx = Arc::new(tx);
    ChunkTransfer::default().send(&*tx, &pattern(100)).await.unwrap();
    drop(tx);

    // 已发送的数据仍可读出
    let bytes = ChunkTransfer::default().receive(&rx, 100).await.unwrap();
    assert_eq!(bytes.len(), 100);
    assert!(ChunkTransfer::default().receive(&rx, 1).await.is_err());
}
