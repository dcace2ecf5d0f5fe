//! Capabilities every PDF data transport provides: a stream owning one full
//! reader and any number of range readers.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ByteRange, Result};

/// Outcome of a single pull from a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Data(Bytes),
    /// The reader is exhausted. Every later `read` returns `Done` again.
    Done,
}

/// Metadata known once the response headers arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderHeaders {
    pub content_length: Option<u64>,
    pub is_streaming_supported: bool,
    pub is_range_supported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub loaded: u64,
    pub total: Option<u64>,
}

pub trait ProgressSubscriber: Send + Sync {
    fn notify_progress(&self, event: ProgressEvent);
}

/// Reader over the whole resource.
#[async_trait]
pub trait FullReader: Send + Sync {
    /// Resolves once `content_length`, `is_range_supported` and
    /// `is_streaming_supported` are meaningful.
    async fn headers_ready(&self) -> Result<()>;

    fn content_length(&self) -> Option<u64>;

    fn is_range_supported(&self) -> bool;

    fn is_streaming_supported(&self) -> bool;

    fn filename(&self) -> Option<String> {
        None
    }

    async fn read(&self) -> Result<ReadResult>;

    /// Best effort, safe to call on a finished or cancelled reader.
    fn cancel(&self, reason: &str);

    fn subscribe(&self, _subscriber: Arc<dyn ProgressSubscriber>) {}
}

/// Reader bounded to the `[begin, end)` it was created for.
///
/// Chunks are taken to start at `range().begin()`. Servers that answer with
/// a different offset, or with the whole file, are not corrected for here;
/// use [`RequestHandler`](crate::network::RequestHandler) directly when the
/// reported offset matters.
#[async_trait]
pub trait RangeReader: Send + Sync {
    fn range(&self) -> ByteRange;

    /// A range fetch is bounded, so it never streams.
    fn is_streaming_supported(&self) -> bool {
        false
    }

    async fn read(&self) -> Result<ReadResult>;

    fn cancel(&self, reason: &str);

    fn subscribe(&self, _subscriber: Arc<dyn ProgressSubscriber>) {}
}

/// Owner of the readers of one resource.
pub trait PdfStream: Send {
    /// # Panics
    ///
    /// When a full reader already exists and was not released by
    /// [`PdfStream::cancel_full_reader`] or
    /// [`PdfStream::cancel_all_requests`].
    fn get_full_reader(&mut self) -> Arc<dyn FullReader>;

    /// Cancels the full reader, if any, and releases it so another one may
    /// be requested. Range readers are left alone.
    fn cancel_full_reader(&mut self, reason: &str);

    fn get_range_reader(
        &mut self,
        range: ByteRange,
    ) -> Result<Arc<dyn RangeReader>>;

    /// Cancels the full reader and every range reader, then forgets them.
    fn cancel_all_requests(&mut self, reason: &str);
}

/// Drains a full reader, returning every chunk it produced.
pub async fn read_all_chunks(reader: &dyn FullReader) -> Result<Vec<Bytes>> {
    let mut chunks = Vec::new();
    while let ReadResult::Data(chunk) = reader.read().await? {
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Drains a range reader, returning every chunk it produced.
pub async fn read_all_range_chunks(
    reader: &dyn RangeReader,
) -> Result<Vec<Bytes>> {
    let mut chunks = Vec::new();
    while let ReadResult::Data(chunk) = reader.read().await? {
        chunks.push(chunk);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_wire_shape() {
        let headers = ReaderHeaders {
            content_length: Some(42),
            is_streaming_supported: false,
            is_range_supported: true,
        };
        let json = serde_json::to_value(headers).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contentLength": 42,
                "isStreamingSupported": false,
                "isRangeSupported": true,
            })
        );
    }
}
