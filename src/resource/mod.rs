//! Byte-range sources an [`EdfReader`](crate::EdfReader) can sit on
//!
//! Every source answers the same question: give me the bytes in the
//! half-open range `[from, till)`. `from` defaults to the start and `till`
//! to the end of the resource.
//!
//! - [`LocalResource`]: an in-memory buffer or a file on disk
//! - [`HttpResource`]: ranged GET requests against a URL
//! - [`PeerResource`]: request/reply over per-request peer data channels
//!
//! The caller picks the source when building it; [`Resource`] wraps all three
//! behind one type for code that does not want to be generic.

mod http;
mod local;
mod peer;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use http::HttpResource;
pub use local::LocalResource;
pub use peer::{PeerFileServer, PeerRequest, PeerResource, Rewrite};

/// Half-open byte range `[from, till)`; open ends default to the resource bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub till: Option<u64>,
}

impl ByteRange {
    pub fn new(from: u64, till: u64) -> Self {
        ByteRange { from: Some(from), till: Some(till) }
    }

    /// The whole resource
    pub fn full() -> Self {
        ByteRange::default()
    }

    pub fn starting_at(from: u64) -> Self {
        ByteRange { from: Some(from), till: None }
    }

    /// Resolves defaults against a (possibly unknown) resource size
    ///
    /// `till` is clamped to `size` and never ends up before `from`.
    pub fn resolve(&self, size: Option<u64>) -> (u64, Option<u64>) {
        let from = self.from.unwrap_or(0);
        let till = match (self.till, size) {
            (Some(till), Some(size)) => Some(till.min(size)),
            (Some(till), None) => Some(till),
            (None, size) => size,
        };
        (from, till.map(|till| till.max(from)))
    }

    /// Number of bytes the range asks for, when both ends are known
    pub fn len(&self) -> Option<u64> {
        self.till.map(|till| till.saturating_sub(self.from.unwrap_or(0)))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

/// How the caller wants the bytes decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    #[default]
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Text(text) => Bytes::from(text),
            Payload::Binary(bytes) => bytes,
        }
    }
}

/// Read access to a byte-addressable resource
#[async_trait]
pub trait ByteRangeResource: Send + Sync {
    /// Raw bytes of `range`; shorter than asked when the range passes the end
    async fn read_bytes(&self, range: ByteRange) -> Result<Bytes>;

    /// Total size in bytes, if known
    fn size(&self) -> Option<u64>;

    /// Display name, usually the file name
    fn name(&self) -> &str;

    async fn read(&self, range: ByteRange, kind: ReadKind) -> Result<Payload> {
        let bytes = self.read_bytes(range).await?;
        Ok(match kind {
            ReadKind::Text => Payload::Text(String::from_utf8_lossy(&bytes).into_owned()),
            ReadKind::Binary => Payload::Binary(bytes),
        })
    }
}

#[async_trait]
impl<R: ByteRangeResource + ?Sized> ByteRangeResource for Arc<R> {
    async fn read_bytes(&self, range: ByteRange) -> Result<Bytes> {
        (**self).read_bytes(range).await
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Any of the shipped sources, selected at construction
pub enum Resource {
    Local(LocalResource),
    Http(HttpResource),
    Peer(PeerResource),
}

impl From<LocalResource> for Resource {
    fn from(resource: LocalResource) -> Self {
        Resource::Local(resource)
    }
}

impl From<HttpResource> for Resource {
    fn from(resource: HttpResource) -> Self {
        Resource::Http(resource)
    }
}

impl From<PeerResource> for Resource {
    fn from(resource: PeerResource) -> Self {
        Resource::Peer(resource)
    }
}

impl Resource {
    /// True when the bytes come from this machine
    pub fn is_local(&self) -> bool {
        matches!(self, Resource::Local(_))
    }
}

#[async_trait]
impl ByteRangeResource for Resource {
    async fn read_bytes(&self, range: ByteRange) -> Result<Bytes> {
        match self {
            Resource::Local(resource) => resource.read_bytes(range).await,
            Resource::Http(resource) => resource.read_bytes(range).await,
            Resource::Peer(resource) => resource.read_bytes(range).await,
        }
    }

    fn size(&self) -> Option<u64> {
        match self {
            Resource::Local(resource) => resource.size(),
            Resource::Http(resource) => resource.size(),
            Resource::Peer(resource) => resource.size(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Resource::Local(resource) => resource.name(),
            Resource::Http(resource) => resource.name(),
            Resource::Peer(resource) => resource.name(),
        }
    }
}
