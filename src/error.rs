use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdfError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    FormatError(String),

    #[error("Bad interval: till ({till} ms) must be greater than from ({from} ms)")]
    BadInterval { from: f64, till: f64 },

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Range request {from}-{till} not honoured by {url}")]
    RangeUnsupported { url: String, from: u64, till: u64 },

    #[error("Received more than expected: {received} of {expected} bytes")]
    OverflowError { expected: usize, received: usize },

    #[error("Channel {0} is not open")]
    ChannelNotOpen(String),

    #[error("Invalid peer message: {0}")]
    Message(#[from] serde_json::Error),
}

impl EdfError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        EdfError::FormatError(msg.into())
    }

    pub(crate) fn transport(msg: impl Into<String>) -> Self {
        EdfError::TransportError(msg.into())
    }

    /// True for errors raised by the byte source rather than by EDF decoding
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EdfError::Io(_)
                | EdfError::TransportError(_)
                | EdfError::Http(_)
                | EdfError::HttpStatus { .. }
                | EdfError::RangeUnsupported { .. }
                | EdfError::OverflowError { .. }
                | EdfError::ChannelNotOpen(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EdfError>;
