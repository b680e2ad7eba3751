//! # edfstream
//!
//! Windowed reading of EDF (European Data Format) biosignal recordings from
//! byte sources that may be local, behind an HTTP server, or held by a remote
//! peer. Only the bytes a request needs are fetched: the header once, then
//! whole data records covering the asked time span.
//!
//! ## Quick Start
//!
//! ### Reading a time span
//!
//! ```rust
//! use edfstream::{DataRequest, EdfReader, Result};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! # let resource = edfstream::doctest_utils::sine_resource(2, 60)?;
//! // resource: any ByteRangeResource (LocalResource, HttpResource, PeerResource)
//! let reader = EdfReader::new(resource);
//!
//! let header = reader.read_header().await?;
//! println!("{} signals, {:.0} s", header.number_of_signals, header.duration_ms() / 1000.0);
//!
//! // 10 s to 20 s after the start, reduced to about 50 points per second
//! let data = reader
//!     .get_data(DataRequest::new(10_000.0, 20_000.0).with_frequency(50.0))
//!     .await?;
//!
//! for (channel, points) in reader.header().unwrap().channels.iter().zip(&data) {
//!     println!("{}: {} points", channel.standard_label, points.len());
//! }
//! # assert_eq!(data.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Panning a viewer window
//!
//! ```rust
//! use edfstream::{EdfReader, WindowBuffer, WindowConfig, Result};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! # let resource = edfstream::doctest_utils::sine_resource(1, 600)?;
//! let buffer = WindowBuffer::open(EdfReader::new(resource), WindowConfig::default()).await?;
//! buffer.set_viewport_width(1200.0);
//!
//! buffer.move_right().await?;
//! buffer.zoom_to(60.0).await?;
//!
//! let window = buffer.window();
//! let held = buffer.buffer_range().unwrap();
//! assert!(held.covers(&window));
//! # Ok(())
//! # }
//! ```
//!
//! ## Byte sources
//!
//! | Source | Reads |
//! |--------|-------|
//! | [`LocalResource`](resource::LocalResource) | memory buffer or file on disk |
//! | [`HttpResource`](resource::HttpResource) | `Range` requests, size from `HEAD` |
//! | [`PeerResource`](resource::PeerResource) | one data channel per request, chunked reply |
//!
//! The serving side of the peer protocol is
//! [`PeerFileServer`](resource::PeerFileServer).
//!
//! ## File layout
//!
//! - 256 byte static header
//! - 256 bytes per signal, stored field by field
//! - data records of interleaved little-endian `i16` samples
//!
//! Physical values are
//! `(raw - digital_min) * (physical_max - physical_min + 1) / (digital_max - digital_min + 1) + physical_min`.

pub mod builder;
pub mod channel;
pub mod config;
pub mod decimate;
pub mod error;
pub mod labels;
pub mod reader;
pub mod resource;
pub mod transfer;
pub mod types;
pub mod utils;
pub mod window;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use builder::{EdfBuilder, SignalSpec};
pub use config::{HttpConfig, PeerConfig, RangeEnd, TransferConfig, WindowConfig};
pub use error::{EdfError, Result};
pub use reader::EdfReader;
pub use resource::{ByteRange, ByteRangeResource, Resource};
pub use types::{BufferRange, Channel, DataPoint, DataRequest, EdfHeader, TimeRange, ViewWindow};
pub use window::{LoadOutcome, WindowBuffer};

// Important constants
pub const STATIC_HEADER_SIZE: usize = 256;
pub const SIGNAL_HEADER_SIZE: usize = 256;
pub const SAMPLE_SIZE: usize = 2; // 16-bit little-endian
/// Largest count the four-character `ns` field can hold
pub const MAX_SIGNALS: usize = 9999;
/// Two-digit years above this are 19yy, the rest 20yy
pub const YEAR_PIVOT: i32 = 30;

/// Library version
///
/// ```rust
/// let version = edfstream::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
