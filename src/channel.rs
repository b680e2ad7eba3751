//! Peer data channels
//!
//! [`DataChannel`] is the slice of a WebRTC-style data channel the peer
//! transport needs: ordered, reliable delivery of text and binary messages,
//! a counter of bytes queued but not yet delivered, and a way to wait for
//! that counter to drop. [`PeerLink`] opens and accepts labelled channels to
//! one remote peer.
//!
//! [`MemoryPeer`] and [`MemoryChannel`] implement both in-process on top of
//! tokio primitives, for loopback setups and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::trace;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};

use crate::error::{EdfError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

impl ChannelMessage {
    pub fn len(&self) -> usize {
        match self {
            ChannelMessage::Text(text) => text.len(),
            ChannelMessage::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// One ordered, reliable message channel to a peer
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn state(&self) -> ChannelState;

    fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Resolves once the channel is open; fails with `ChannelNotOpen` if it closes first
    async fn opened(&self) -> Result<()>;

    /// Bytes handed to `send` that the remote side has not consumed yet
    fn buffered_amount(&self) -> usize;

    /// Resolves once `buffered_amount() <= threshold` or the channel closed
    async fn buffered_amount_low(&self, threshold: usize);

    async fn send(&self, message: ChannelMessage) -> Result<()>;

    /// Next message; `None` once the channel is closed and drained
    async fn recv(&self) -> Option<ChannelMessage>;
}

/// Connection to one remote peer that can carry many labelled channels
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Opens a channel with `label`; it may still be connecting when returned
    async fn data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    /// Next channel opened by the remote side; `None` once the link is gone
    async fn accept(&self) -> Option<Arc<dyn DataChannel>>;
}

/// One direction of a memory channel
#[derive(Default)]
struct Pipe {
    queue: Mutex<VecDeque<ChannelMessage>>,
    buffered: AtomicUsize,
    closed: AtomicBool,
    readable: Notify,
    drained: Notify,
}

impl Pipe {
    fn push(&self, message: ChannelMessage) {
        self.buffered.fetch_add(message.len(), Ordering::SeqCst);
        self.queue.lock().push_back(message);
        self.readable.notify_one();
    }

    fn pop(&self) -> Option<ChannelMessage> {
        let message = self.queue.lock().pop_front()?;
        self.buffered.fetch_sub(message.len(), Ordering::SeqCst);
        self.drained.notify_waiters();
        Some(message)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.readable.notify_one();
        self.drained.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-process end of a data channel
pub struct MemoryChannel {
    label: String,
    outgoing: Arc<Pipe>,
    incoming: Arc<Pipe>,
    state: Arc<watch::Sender<ChannelState>>,
}

impl MemoryChannel {
    /// Two connected ends that are already open
    pub fn pair(label: impl Into<String>) -> (MemoryChannel, MemoryChannel) {
        let (local, remote) = Self::connecting_pair(label.into());
        local.state.send_replace(ChannelState::Open);
        (local, remote)
    }

    fn connecting_pair(label: String) -> (MemoryChannel, MemoryChannel) {
        let forward = Arc::new(Pipe::default());
        let backward = Arc::new(Pipe::default());
        let (state, _) = watch::channel(ChannelState::Connecting);
        let state = Arc::new(state);

        let local = MemoryChannel {
            label: label.clone(),
            outgoing: forward.clone(),
            incoming: backward.clone(),
            state: state.clone(),
        };
        let remote = MemoryChannel {
            label,
            outgoing: backward,
            incoming: forward,
            state,
        };
        (local, remote)
    }

    fn mark_open(&self) {
        self.state.send_if_modified(|state| {
            if *state == ChannelState::Connecting {
                *state = ChannelState::Open;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.outgoing.close();
        self.incoming.close();
        self.state.send_replace(ChannelState::Closed);
    }
}

#[async_trait]
impl DataChannel for MemoryChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    async fn opened(&self) -> Result<()> {
        let mut state = self.state.subscribe();
        let settled = state
            .wait_for(|state| *state != ChannelState::Connecting)
            .await
            .map(|state| *state);
        match settled {
            Ok(ChannelState::Open) => Ok(()),
            _ => Err(EdfError::ChannelNotOpen(self.label.clone())),
        }
    }

    fn buffered_amount(&self) -> usize {
        self.outgoing.buffered.load(Ordering::SeqCst)
    }

    async fn buffered_amount_low(&self, threshold: usize) {
        loop {
            let drained = self.outgoing.drained.notified();
            if self.buffered_amount() <= threshold || self.outgoing.is_closed() {
                return;
            }
            drained.await;
        }
    }

    async fn send(&self, message: ChannelMessage) -> Result<()> {
        if self.state() != ChannelState::Open || self.outgoing.is_closed() {
            return Err(EdfError::ChannelNotOpen(self.label.clone()));
        }
        trace!("{} send {} bytes", self.label, message.len());
        self.outgoing.push(message);
        Ok(())
    }

    async fn recv(&self) -> Option<ChannelMessage> {
        loop {
            let readable = self.incoming.readable.notified();
            if let Some(message) = self.incoming.pop() {
                return Some(message);
            }
            if self.incoming.is_closed() {
                return None;
            }
            readable.await;
        }
    }
}

/// One side of an in-process peer connection
pub struct MemoryPeer {
    remote: mpsc::UnboundedSender<MemoryChannel>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryChannel>>,
}

impl MemoryPeer {
    pub fn pair() -> (MemoryPeer, MemoryPeer) {
        let (to_b, from_a) = mpsc::unbounded_channel();
        let (to_a, from_b) = mpsc::unbounded_channel();
        (
            MemoryPeer { remote: to_b, incoming: tokio::sync::Mutex::new(from_b) },
            MemoryPeer { remote: to_a, incoming: tokio::sync::Mutex::new(from_a) },
        )
    }
}

#[async_trait]
impl PeerLink for MemoryPeer {
    async fn data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let (local, remote) = MemoryChannel::connecting_pair(label.to_string());
        // 对端已断开时 remote 随错误一起被丢弃，通道变为 Closed
        let _ = self.remote.send(remote);
        Ok(Arc::new(local))
    }

    async fn accept(&self) -> Option<Arc<dyn DataChannel>> {
        let channel = self.incoming.lock().await.recv().await?;
        channel.mark_open();
        Some(Arc::new(channel))
    }
}
