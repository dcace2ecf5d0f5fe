use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use reqwest::header::{
    HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE,
};
use tokio::task::AbortHandle;
use url::Url;

use super::http::{HttpClient, HttpRequest};
use crate::transport::ProgressEvent;
use crate::{ByteRange, ContentRange, Result};

pub type RequestId = u64;

pub const OK_RESPONSE: u16 = 200;
pub const PARTIAL_CONTENT_RESPONSE: u16 = 206;

/// Status and headers of a response whose body is still in flight.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

/// A completed transfer. `begin` is the offset the server says the chunk
/// starts at.
#[derive(Debug, Clone)]
pub struct DoneEvent {
    pub begin: u64,
    pub chunk: Bytes,
}

/// Receives the events of one request.
///
/// Every callback runs on the task driving the request, outside of the
/// engine's lock, so handlers may call back into the engine.
pub trait RequestHandler: Send + Sync {
    /// Fires at most once per request.
    fn on_headers_received(&self, _id: RequestId, _head: &ResponseHead) {}

    fn on_progress(&self, _event: ProgressEvent) {}

    fn on_done(&self, event: DoneEvent);

    /// `status` is `0` for transport failures.
    fn on_error(&self, status: u16);
}

struct PendingRequest {
    /// Receives every event of the request.
    handler: Arc<dyn RequestHandler>,
    /// `200` for full requests, `206` for range requests.
    expected_status: u16,
    /// Task driving the request. `None` until the task was spawned.
    task: Option<AbortHandle>,
}

#[derive(Default)]
struct EngineState {
    /// Id handed to the next request. Ids are never reused.
    next_id: RequestId,
    /// Requests that neither completed, failed nor were aborted.
    pending: HashMap<RequestId, PendingRequest>,
    /// Requests that completed with a usable response.
    loaded: HashSet<RequestId>,
}

struct EngineInner {
    url: Url,
    http_headers: HeaderMap,
    client: Arc<dyn HttpClient>,
    state: Mutex<EngineState>,
}

/// Issues GET requests, optionally scoped with a `Range` header, against a
/// single URL and reports their outcome to per-request handlers.
///
/// Cloning yields another handle to the same engine. Requests are driven by
/// tasks spawned on the current tokio runtime.
#[derive(Clone)]
pub struct NetworkManager {
    inner: Arc<EngineInner>,
}

impl NetworkManager {
    pub fn new(
        url: Url,
        http_headers: HeaderMap,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                url,
                http_headers,
                client,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn is_http(&self) -> bool {
        matches!(self.inner.url.scheme(), "http" | "https")
    }

    pub fn request_full(&self, handler: Arc<dyn RequestHandler>) -> RequestId {
        let headers = self.inner.http_headers.clone();
        self.request(headers, OK_RESPONSE, handler)
    }

    pub fn request_range(
        &self,
        range: ByteRange,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<RequestId> {
        let mut headers = self.inner.http_headers.clone();
        headers.insert(RANGE, HeaderValue::from_str(&range.header_value())?);
        Ok(self.request(headers, PARTIAL_CONTENT_RESPONSE, handler))
    }

    fn request(
        &self,
        headers: HeaderMap,
        expected_status: u16,
        handler: Arc<dyn RequestHandler>,
    ) -> RequestId {
        let id = {
            let mut state = self.inner.state();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(
                id,
                PendingRequest {
                    handler,
                    expected_status,
                    task: None,
                },
            );
            id
        };

        log::debug!(
            "network/{}: request {} expecting {}",
            self.inner.url,
            id,
            expected_status
        );

        let request = HttpRequest {
            url: self.inner.url.clone(),
            headers,
        };
        let task = tokio::spawn(drive(self.inner.clone(), id, request));

        // The task may already have finished and dropped the record.
        if let Some(pending) = self.inner.state().pending.get_mut(&id) {
            pending.task = Some(task.abort_handle());
        }
        id
    }

    pub fn has_pending_requests(&self) -> bool {
        !self.inner.state().pending.is_empty()
    }

    pub fn is_pending_request(&self, id: RequestId) -> bool {
        self.inner
            .state()
            .pending
            .contains_key(&id)
    }

    pub fn is_loaded_request(&self, id: RequestId) -> bool {
        self.inner.state().loaded.contains(&id)
    }

    /// No-op for finished or unknown requests.
    pub fn abort_request(&self, id: RequestId) {
        let pending = self.inner.state().pending.remove(&id);
        if let Some(pending) = pending {
            log::debug!("network/{}: aborting request {}", self.inner.url, id);
            if let Some(task) = pending.task {
                task.abort();
            }
        }
    }

    pub fn abort_all_requests(&self) {
        let drained: Vec<_> = self
            .inner
            .state()
            .pending
            .drain()
            .collect();
        for (id, pending) in drained {
            log::debug!("network/{}: aborting request {}", self.inner.url, id);
            if let Some(task) = pending.task {
                task.abort();
            }
        }
    }
}

impl EngineInner {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` once the request was completed or aborted.
    fn handler(&self, id: RequestId) -> Option<Arc<dyn RequestHandler>> {
        self.state()
            .pending
            .get(&id)
            .map(|pending| pending.handler.clone())
    }

    fn fail(&self, id: RequestId, status: u16) {
        let pending = self.state().pending.remove(&id);
        if let Some(pending) = pending {
            pending.handler.on_error(status);
        }
    }

    fn complete(&self, id: RequestId, head: ResponseHead, chunk: Bytes) {
        let Some(pending) = self.state().pending.remove(&id) else {
            return;
        };

        let status = head.status;
        // Some servers ignore the Range header and send the whole file.
        let ok_response_on_range_request = status == OK_RESPONSE
            && pending.expected_status == PARTIAL_CONTENT_RESPONSE;
        if !ok_response_on_range_request && status != pending.expected_status
        {
            log::warn!(
                "network/{}: request {} answered {} instead of {}",
                self.url,
                id,
                status,
                pending.expected_status
            );
            pending.handler.on_error(status);
            return;
        }

        if status == PARTIAL_CONTENT_RESPONSE {
            let content_range = head
                .headers
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(ContentRange::parse);
            match content_range {
                Some(content_range) => {
                    self.state().loaded.insert(id);
                    pending.handler.on_done(DoneEvent {
                        begin: content_range.begin,
                        chunk,
                    });
                }
                None => {
                    log::warn!(
                        "network/{}: request {} has no usable Content-Range",
                        self.url,
                        id
                    );
                    pending.handler.on_error(status);
                }
            }
        } else {
            self.state().loaded.insert(id);
            pending
                .handler
                .on_done(DoneEvent { begin: 0, chunk });
        }
    }
}

async fn drive(inner: Arc<EngineInner>, id: RequestId, request: HttpRequest) {
    let response = match inner.client.send(request).await {
        Ok(response) => response,
        Err(err) => {
            log::warn!("network/{}: request {} failed: {}", inner.url, id, err);
            inner.fail(id, 0);
            return;
        }
    };

    let head = ResponseHead {
        status: response.status,
        headers: response.headers,
    };
    let mut body = response.body;

    match inner.handler(id) {
        Some(handler) => handler.on_headers_received(id, &head),
        None => return,
    }

    let total = head
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let mut buffer = BytesMut::new();
    loop {
        // Aborted, possibly from inside one of the callbacks.
        let Some(handler) = inner.handler(id) else {
            return;
        };
        match body.chunk().await {
            Ok(Some(piece)) => {
                buffer.extend_from_slice(&piece);
                handler.on_progress(ProgressEvent {
                    loaded: buffer.len() as u64,
                    total,
                });
            }
            Ok(None) => break,
            Err(err) => {
                log::warn!(
                    "network/{}: request {} body failed: {}",
                    inner.url,
                    id,
                    err
                );
                inner.fail(id, 0);
                return;
            }
        }
    }

    inner.complete(id, head, buffer.freeze());
}
