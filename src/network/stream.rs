use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use super::http::{HttpClient, ReqwestClient};
use super::manager::{
    DoneEvent, NetworkManager, RequestHandler, RequestId, ResponseHead,
    OK_RESPONSE,
};
use super::queue::ChunkQueue;
use super::utils::{
    extract_filename_from_header, validate_range_request_capabilities,
};
use crate::errors::create_response_status_error;
use crate::transport::{
    FullReader, PdfStream, ProgressEvent, ProgressSubscriber, RangeReader,
    ReadResult,
};
use crate::{ByteRange, Result, StreamConfig, StreamError};

/// [`PdfStream`] fetching a remote file over HTTP.
pub struct NetworkStream {
    manager: NetworkManager,
    config: StreamConfig,
    full_reader: Option<Arc<NetworkFullReader>>,
    range_readers: Vec<Arc<NetworkRangeReader>>,
}

impl NetworkStream {
    pub fn new(config: StreamConfig) -> Result<Self> {
        Self::with_client(config, Arc::new(ReqwestClient::new()?))
    }

    pub fn with_client(
        config: StreamConfig,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let manager = NetworkManager::new(
            config.url.clone(),
            config.header_map()?,
            client,
        );
        Ok(Self {
            manager,
            config,
            full_reader: None,
            range_readers: Vec::new(),
        })
    }

    pub fn manager(&self) -> &NetworkManager {
        &self.manager
    }
}

impl PdfStream for NetworkStream {
    fn get_full_reader(&mut self) -> Arc<dyn FullReader> {
        assert!(
            self.full_reader.is_none(),
            "NetworkStream::get_full_reader can only be called once"
        );
        let reader = Arc::new(NetworkFullReader::new(
            self.manager.clone(),
            &self.config,
        ));
        self.full_reader = Some(reader.clone());
        reader
    }

    fn get_range_reader(
        &mut self,
        range: ByteRange,
    ) -> Result<Arc<dyn RangeReader>> {
        self.range_readers
            .retain(|reader| !reader.is_closed());
        let reader =
            Arc::new(NetworkRangeReader::new(self.manager.clone(), range)?);
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
        for reader in std::mem::take(&mut self.range_readers) {
            reader.cancel(reason);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeadersState {
    Pending,
    Ready,
    Failed(u16),
    Cancelled(String),
}

#[derive(Default)]
struct FullReaderInfo {
    content_length: Option<u64>,
    is_range_supported: bool,
    filename: Option<String>,
}

struct FullRequestHandler {
    manager: NetworkManager,
    range_chunk_size: u64,
    disable_range: bool,
    queue: ChunkQueue,
    headers: watch::Sender<HeadersState>,
    info: Mutex<FullReaderInfo>,
}

impl FullRequestHandler {
    fn info(&self) -> MutexGuard<'_, FullReaderInfo> {
        self.info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn settle_headers(&self, state: HeadersState) {
        self.headers.send_if_modified(|current| {
            if *current == HeadersState::Pending {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

impl RequestHandler for FullRequestHandler {
    fn on_headers_received(&self, id: RequestId, head: &ResponseHead) {
        // Failed responses settle the headers through `on_error`.
        if head.status != OK_RESPONSE {
            return;
        }

        let capabilities = validate_range_request_capabilities(
            &head.headers,
            self.manager.is_http(),
            self.range_chunk_size,
            self.disable_range,
        );

        let is_range_supported = {
            let mut info = self.info();
            if capabilities.allow_range_requests {
                info.is_range_supported = true;
            }
            info.content_length =
                capabilities.suggested_length.or(info.content_length);
            info.filename = extract_filename_from_header(&head.headers);
            info.is_range_supported
        };

        if is_range_supported {
            // The rest of the file is fetched with range requests. Servers
            // that only allow a single download of the file lose here.
            log::debug!(
                "network/{}: ranges supported, dropping full request {}",
                self.manager.url(),
                id
            );
            self.manager.abort_request(id);
        }

        self.settle_headers(HeadersState::Ready);
    }

    fn on_progress(&self, event: ProgressEvent) {
        let total = event
            .total
            .or(self.info().content_length);
        self.queue.notify_progress(ProgressEvent {
            loaded: event.loaded,
            total,
        });
    }

    fn on_done(&self, event: DoneEvent) {
        self.queue.push(event.chunk);
        self.queue.finish();
    }

    fn on_error(&self, status: u16) {
        self.queue.fail(status);
        self.settle_headers(HeadersState::Failed(status));
    }
}

/// Reads the whole file with one request.
///
/// When the headers reveal that ranges are usable the request is aborted
/// right away and this reader never completes; callers are expected to
/// switch to range readers and cancel it.
pub struct NetworkFullReader {
    manager: NetworkManager,
    request_id: RequestId,
    handler: Arc<FullRequestHandler>,
    is_streaming_supported: bool,
}

impl NetworkFullReader {
    fn new(manager: NetworkManager, config: &StreamConfig) -> Self {
        let (headers, _) = watch::channel(HeadersState::Pending);
        let handler = Arc::new(FullRequestHandler {
            manager: manager.clone(),
            range_chunk_size: config.range_chunk_size,
            disable_range: config.disable_range,
            queue: ChunkQueue::new(config.url.to_string()),
            headers,
            info: Mutex::new(FullReaderInfo {
                content_length: config.length,
                ..Default::default()
            }),
        });
        let request_id = manager.request_full(handler.clone());
        Self {
            manager,
            request_id,
            handler,
            // Responses are delivered whole, never chunk by chunk.
            is_streaming_supported: false,
        }
    }
}

#[async_trait]
impl FullReader for NetworkFullReader {
    async fn headers_ready(&self) -> Result<()> {
        let mut receiver = self.handler.headers.subscribe();
        let state = receiver
            .wait_for(|state| *state != HeadersState::Pending)
            .await
            .map_err(|_| StreamError::ChannelClosed)?
            .clone();
        match state {
            HeadersState::Failed(status) => Err(create_response_status_error(
                status,
                self.manager.url().as_str(),
            )),
            HeadersState::Cancelled(reason) => {
                Err(StreamError::Cancelled(reason))
            }
            _ => Ok(()),
        }
    }

    fn content_length(&self) -> Option<u64> {
        self.handler.info().content_length
    }

    fn is_range_supported(&self) -> bool {
        self.handler.info().is_range_supported
    }

    fn is_streaming_supported(&self) -> bool {
        self.is_streaming_supported
    }

    fn filename(&self) -> Option<String> {
        self.handler.info().filename.clone()
    }

    async fn read(&self) -> Result<ReadResult> {
        self.handler.queue.read().await
    }

    fn cancel(&self, reason: &str) {
        self.handler.queue.cancel();
        self.handler
            .settle_headers(HeadersState::Cancelled(reason.to_string()));
        if self
            .manager
            .is_pending_request(self.request_id)
        {
            self.manager.abort_request(self.request_id);
        }
    }

    fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.handler.queue.subscribe(subscriber);
    }
}

struct RangeRequestHandler {
    range: ByteRange,
    queue: ChunkQueue,
}

impl RequestHandler for RangeRequestHandler {
    fn on_progress(&self, event: ProgressEvent) {
        self.queue.notify_progress(ProgressEvent {
            loaded: event.loaded,
            total: None,
        });
    }

    fn on_done(&self, event: DoneEvent) {
        if event.begin != self.range.begin() {
            log::warn!(
                "network: range {} was answered from offset {}",
                self.range,
                event.begin
            );
        }
        self.queue.push(event.chunk);
        self.queue.finish();
    }

    fn on_error(&self, status: u16) {
        self.queue.fail(status);
    }
}

/// Reads `[begin, end)` with one range request.
pub struct NetworkRangeReader {
    manager: NetworkManager,
    range: ByteRange,
    request_id: RequestId,
    handler: Arc<RangeRequestHandler>,
}

impl NetworkRangeReader {
    fn new(manager: NetworkManager, range: ByteRange) -> Result<Self> {
        let handler = Arc::new(RangeRequestHandler {
            range,
            queue: ChunkQueue::new(manager.url().to_string()),
        });
        let request_id = manager.request_range(range, handler.clone())?;
        Ok(Self {
            manager,
            range,
            request_id,
            handler,
        })
    }

    fn is_closed(&self) -> bool {
        self.handler.queue.is_closed()
    }
}

#[async_trait]
impl RangeReader for NetworkRangeReader {
    fn range(&self) -> ByteRange {
        self.range
    }

    async fn read(&self) -> Result<ReadResult> {
        self.handler.queue.read().await
    }

    fn cancel(&self, _reason: &str) {
        self.handler.queue.cancel();
        if self
            .manager
            .is_pending_request(self.request_id)
        {
            self.manager.abort_request(self.request_id);
        }
    }

    fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.handler.queue.subscribe(subscriber);
    }
}
