use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::transport::ReaderHeaders;

/// Opens a remote reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamRequest {
    GetReader,
    GetRangeReader { begin: u64, end: u64 },
}

/// One-shot answer carrying the full reader's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadersMessage {
    Ready(ReaderHeaders),
    Failed(String),
}

/// Items of a remote reader, ending with `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderMessage {
    Chunk(Bytes),
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMessage {
    pub reason: String,
}

/// A [`StreamRequest`] together with the channels its answers travel on.
pub struct StreamEnvelope {
    pub stream_id: Uuid,
    pub request: StreamRequest,
    /// Set for `GetReader` only.
    pub headers: Option<oneshot::Sender<HeadersMessage>>,
    pub events: mpsc::Sender<ReaderMessage>,
    pub cancel: oneshot::Receiver<CancelMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_wire_shape() {
        assert_eq!(
            serde_json::to_value(StreamRequest::GetReader).unwrap(),
            json!("GetReader")
        );
        assert_eq!(
            serde_json::to_value(StreamRequest::GetRangeReader {
                begin: 10,
                end: 20
            })
            .unwrap(),
            json!({"GetRangeReader": {"begin": 10, "end": 20}})
        );
    }

    #[test]
    fn headers_message_carries_metadata() {
        let message = HeadersMessage::Ready(ReaderHeaders {
            content_length: None,
            is_streaming_supported: true,
            is_range_supported: false,
        });
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"Ready": {
                "contentLength": null,
                "isStreamingSupported": true,
                "isRangeSupported": false,
            }})
        );
    }

    #[test]
    fn chunks_survive_the_wire() {
        let message = ReaderMessage::Chunk(Bytes::from_static(b"%PDF-1.7"));
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: ReaderMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
    }
}
