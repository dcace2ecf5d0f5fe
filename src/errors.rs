use thiserror::Error;

use crate::range::ByteRange;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(
        "Unexpected server response ({status}) while retrieving PDF \"{url}\"."
    )]
    UnexpectedResponse { status: u16, url: String },
    #[error("Missing PDF \"{0}\".")]
    MissingPdf(String),
    #[error("Invalid byte range: {begin}-{end}")]
    InvalidRange { begin: u64, end: u64 },
    #[error("Bytes {0} are not loaded")]
    MissingData(ByteRange),
    #[error("Gave up on bytes {range} after {attempts} chunk loads")]
    RetryLimit { range: ByteRange, attempts: usize },
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Request aborted: {0}")]
    Aborted(String),
    #[error("Message channel closed")]
    ChannelClosed,
    #[error("Remote stream error: {0}")]
    Remote(String),
    #[error("Parsing error")]
    Parse,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for StreamError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}

impl From<reqwest::header::InvalidHeaderValue> for StreamError {
    fn from(_: reqwest::header::InvalidHeaderValue) -> Self {
        Self::Parse
    }
}

impl From<reqwest::header::InvalidHeaderName> for StreamError {
    fn from(_: reqwest::header::InvalidHeaderName) -> Self {
        Self::Parse
    }
}

/// Maps a failed response status to the error reported to readers.
///
/// Status `0` stands for a transport failure. On a `file:` URL it means the
/// file does not exist.
pub fn create_response_status_error(status: u16, url: &str) -> StreamError {
    if status == 404 || (status == 0 && url.starts_with("file:")) {
        return StreamError::MissingPdf(url.to_string());
    }
    StreamError::UnexpectedResponse {
        status,
        url: url.to_string(),
    }
}
