use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Buffering policy of a [`WindowBuffer`](crate::WindowBuffer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Span fetched per pan/prefetch step, independent of frequency
    pub chunk_width_ms: f64,
    /// Width of the window shown right after opening
    pub initial_window_ms: f64,
    /// The buffer may grow to this many window (or chunk) widths before it slides
    pub buffer_factor: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            chunk_width_ms: 300_000.0,
            initial_window_ms: 30_000.0,
            buffer_factor: 4.0,
        }
    }
}

/// Chunking and flow control of [`ChunkTransfer`](crate::transfer::ChunkTransfer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size: usize,
    /// Sending pauses while more than `low_watermark_chunks × chunk_size` bytes are queued
    pub low_watermark_chunks: usize,
}

impl TransferConfig {
    pub fn low_watermark(&self) -> usize {
        self.chunk_size * self.low_watermark_chunks
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
            low_watermark_chunks: 8,
        }
    }
}

/// How the exclusive end of a byte range becomes the inclusive end of a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeEnd {
    /// Decrement `till` only when it is even; odd ends are sent unchanged
    Legacy,
    /// Always send `till - 1`
    Inclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub range_end: RangeEnd,
    /// Discover the resource size with a HEAD request on connect
    pub probe_size: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            range_end: RangeEnd::Legacy,
            probe_size: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Per-request channels are labelled `<prefix>-<n>`
    pub channel_prefix: String,
    /// Give up waiting for a channel to open after this long; `None` waits forever
    #[serde(with = "optional_millis")]
    pub open_timeout: Option<Duration>,
    pub transfer: TransferConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "edf".to_string(),
            open_timeout: Some(Duration::from_secs(10)),
            transfer: TransferConfig::default(),
        }
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let window = WindowConfig::default();
        assert_eq!(window.chunk_width_ms, 300_000.0);
        assert_eq!(TransferConfig::default().low_watermark(), 8 * 16384);
        assert_eq!(HttpConfig::default().range_end, RangeEnd::Legacy);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PeerConfig = serde_json::from_str(r#"{"open_timeout": 250}"#).unwrap();
        assert_eq!(config.open_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.channel_prefix, "edf");

        let config: PeerConfig = serde_json::from_str(r#"{"open_timeout": null}"#).unwrap();
        assert_eq!(config.open_timeout, None);

        let http: HttpConfig = serde_json::from_str(r#"{"range_end": "inclusive"}"#).unwrap();
        assert_eq!(http.range_end, RangeEnd::Inclusive);
    }
}
