use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::message::{
    CancelMessage, HeadersMessage, ReaderMessage, StreamEnvelope,
    StreamRequest,
};
use crate::transport::{
    FullReader, PdfStream, ProgressEvent, ProgressSubscriber, RangeReader,
    ReadResult, ReaderHeaders,
};
use crate::{ByteRange, Result, StreamError};

/// Chunks buffered per reader before the host has to wait for the worker.
pub const DEFAULT_CHUNK_CAPACITY: usize = 16;

/// Worker-side [`PdfStream`] whose readers are served by a
/// [`StreamHost`](super::StreamHost) over a message channel.
pub struct ProxyStream {
    port: mpsc::UnboundedSender<StreamEnvelope>,
    chunk_capacity: usize,
    full_reader: Option<Arc<ProxyFullReader>>,
    range_readers: Vec<Arc<ProxyRangeReader>>,
}

impl ProxyStream {
    pub(crate) fn new(
        port: mpsc::UnboundedSender<StreamEnvelope>,
        chunk_capacity: usize,
    ) -> Self {
        Self {
            port,
            chunk_capacity: chunk_capacity.max(1),
            full_reader: None,
            range_readers: Vec::new(),
        }
    }

    fn open(
        &self,
        request: StreamRequest,
        headers: Option<oneshot::Sender<HeadersMessage>>,
    ) -> RemoteChannel {
        let stream_id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::channel(self.chunk_capacity);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        log::debug!("proxy/{}: opening {:?}", stream_id, request);

        let envelope = StreamEnvelope {
            stream_id,
            request,
            headers,
            events: events_tx,
            cancel: cancel_rx,
        };
        // A gone host drops the envelope, which closes the reader's channels.
        if self.port.send(envelope).is_err() {
            log::warn!("proxy/{}: host is not listening", stream_id);
        }

        RemoteChannel {
            stream_id,
            events: tokio::sync::Mutex::new(events_rx),
            cancel: Mutex::new(Some(cancel_tx)),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            loaded: AtomicU64::new(0),
            subscribers: RwLock::new(Vec::new()),
        }
    }
}

impl PdfStream for ProxyStream {
    fn get_full_reader(&mut self) -> Arc<dyn FullReader> {
        assert!(
            self.full_reader.is_none(),
            "ProxyStream::get_full_reader can only be called once"
        );
        let (headers_tx, headers_rx) = oneshot::channel();
        let channel = self.open(StreamRequest::GetReader, Some(headers_tx));
        let reader = Arc::new(ProxyFullReader {
            channel,
            headers_rx: tokio::sync::Mutex::new(Some(headers_rx)),
            headers: OnceLock::new(),
        });
        self.full_reader = Some(reader.clone());
        reader
    }

    fn get_range_reader(
        &mut self,
        range: ByteRange,
    ) -> Result<Arc<dyn RangeReader>> {
        self.range_readers
            .retain(|reader| !reader.channel.is_done());
        let channel = self.open(
            StreamRequest::GetRangeReader {
                begin: range.begin(),
                end: range.end(),
            },
            None,
        );
        let reader = Arc::new(ProxyRangeReader { range, channel });
        self.range_readers.push(reader.clone());
        Ok(reader)
    }

    fn cancel_full_reader(&mut self, reason: &str) {
        if let Some(reader) = self.full_reader.take() {
            reader.cancel(reason);
        }
    }

    fn cancel_all_requests(&mut self, reason: &str) {
        self.cancel_full_reader(reason);
        let readers = std::mem::take(&mut self.range_readers);
        for reader in readers {
            reader.cancel(reason);
        }
    }
}

/// Receiving end of one remote reader.
struct RemoteChannel {
    /// Names the reader in the host's logs too.
    stream_id: Uuid,
    /// Chunks pumped by the host, ending with `Done` or `Error`.
    events: tokio::sync::Mutex<mpsc::Receiver<ReaderMessage>>,
    /// Taken by the first `cancel`, so later calls send nothing.
    cancel: Mutex<Option<oneshot::Sender<CancelMessage>>>,
    /// Set once the last message was read or the reader was cancelled.
    done: AtomicBool,
    /// Distinguishes a cancelled reader from a host that went away.
    cancelled: AtomicBool,
    /// Bytes received so far, reported to subscribers.
    loaded: AtomicU64,
    subscribers: RwLock<Vec<Arc<dyn ProgressSubscriber>>>,
}

impl RemoteChannel {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    async fn read(&self, total: Option<u64>) -> Result<ReadResult> {
        if self.is_done() {
            return Ok(ReadResult::Done);
        }
        let message = self.events.lock().await.recv().await;
        match message {
            Some(ReaderMessage::Chunk(chunk)) => {
                let loaded = self
                    .loaded
                    .fetch_add(chunk.len() as u64, Ordering::AcqRel)
                    + chunk.len() as u64;
                self.subscribers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .for_each(|s| {
                        s.notify_progress(ProgressEvent { loaded, total })
                    });
                Ok(ReadResult::Data(chunk))
            }
            Some(ReaderMessage::Done) => {
                self.done.store(true, Ordering::Release);
                Ok(ReadResult::Done)
            }
            Some(ReaderMessage::Error(message)) => {
                self.done.store(true, Ordering::Release);
                Err(StreamError::Remote(message))
            }
            None => {
                self.done.store(true, Ordering::Release);
                if self.cancelled.load(Ordering::Acquire) {
                    Ok(ReadResult::Done)
                } else {
                    Err(StreamError::ChannelClosed)
                }
            }
        }
    }

    fn cancel(&self, reason: &str) {
        self.cancelled.store(true, Ordering::Release);
        self.done.store(true, Ordering::Release);
        let sender = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            log::debug!("proxy/{}: cancelling, {}", self.stream_id, reason);
            // The host may already be finished with this reader.
            let _ = sender.send(CancelMessage {
                reason: reason.to_string(),
            });
        }
    }

    fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }
}

/// Full reader served by the host. Its metadata arrives once, ahead of the
/// first chunk.
pub struct ProxyFullReader {
    channel: RemoteChannel,
    /// Answer to `GetReader`. Taken by the first `headers_ready` call.
    headers_rx: tokio::sync::Mutex<Option<oneshot::Receiver<HeadersMessage>>>,
    /// `None` when the host went away before answering.
    headers: OnceLock<Option<HeadersMessage>>,
}

impl ProxyFullReader {
    fn known_headers(&self) -> ReaderHeaders {
        match self.headers.get() {
            Some(Some(HeadersMessage::Ready(headers))) => *headers,
            _ => ReaderHeaders::default(),
        }
    }
}

#[async_trait]
impl FullReader for ProxyFullReader {
    async fn headers_ready(&self) -> Result<()> {
        {
            let mut receiver = self.headers_rx.lock().await;
            if self.channel.cancelled.load(Ordering::Acquire) {
                receiver.take();
            }
            if let Some(rx) = receiver.take() {
                let _ = self.headers.set(rx.await.ok());
            }
        }
        match self.headers.get() {
            Some(Some(HeadersMessage::Ready(_))) => Ok(()),
            Some(Some(HeadersMessage::Failed(message))) => {
                Err(StreamError::Remote(message.clone()))
            }
            _ if self.channel.cancelled.load(Ordering::Acquire) => Err(
                StreamError::Cancelled("Reader was cancelled".to_string()),
            ),
            _ => Err(StreamError::ChannelClosed),
        }
    }

    fn content_length(&self) -> Option<u64> {
        self.known_headers().content_length
    }

    fn is_range_supported(&self) -> bool {
        self.known_headers().is_range_supported
    }

    fn is_streaming_supported(&self) -> bool {
        self.known_headers()
            .is_streaming_supported
    }

    async fn read(&self) -> Result<ReadResult> {
        self.channel
            .read(self.content_length())
            .await
    }

    fn cancel(&self, reason: &str) {
        self.channel.cancel(reason);
    }

    fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.channel.subscribe(subscriber);
    }
}

pub struct ProxyRangeReader {
    range: ByteRange,
    channel: RemoteChannel,
}

#[async_trait]
impl RangeReader for ProxyRangeReader {
    fn range(&self) -> ByteRange {
        self.range
    }

    async fn read(&self) -> Result<ReadResult> {
        self.channel.read(None).await
    }

    fn cancel(&self, reason: &str) {
        self.channel.cancel(reason);
    }

    fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.channel.subscribe(subscriber);
    }
}
