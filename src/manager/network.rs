use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{Availability, ChunkCache, DocumentModel, PdfManager};
use crate::config::ManagerConfig;
use crate::{ByteRange, Result, StreamError};

/// Manager over a document streamed in on demand.
///
/// Every missing range reported by the model is loaded through the chunk
/// cache, then the operation runs again with the same arguments.
pub struct NetworkPdfManager<M, C> {
    model: M,
    cache: Arc<C>,
    config: ManagerConfig,
    range_permits: Semaphore,
    shutdown: CancellationToken,
    terminated: Mutex<Option<String>>,
}

impl<M, C> NetworkPdfManager<M, C>
where
    M: Send + Sync,
    C: ChunkCache,
{
    pub fn new(
        cache: Arc<C>,
        config: ManagerConfig,
        build: impl FnOnce(C::Stream) -> M,
    ) -> Self {
        let model = build(cache.get_stream());
        Self {
            model,
            cache,
            range_permits: Semaphore::new(config.max_concurrent_ranges.max(1)),
            config,
            shutdown: CancellationToken::new(),
            terminated: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Same as [`PdfManager::ensure`], abandoned as soon as `token` is
    /// cancelled.
    pub async fn ensure_with<T, F>(
        &self,
        mut op: F,
        token: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut(&M) -> Result<Availability<T>>,
    {
        let mut loads = 0;
        loop {
            if token.is_cancelled() {
                return Err(cancelled());
            }
            if self.shutdown.is_cancelled() {
                return Err(self.terminated_error());
            }

            let range = match op(&self.model)? {
                Availability::Ready(value) => return Ok(value),
                Availability::NeedsRange(range) => range,
            };
            if loads >= self.config.max_fault_retries {
                log::warn!(
                    "manager/network: giving up on {} after {} loads",
                    range,
                    loads
                );
                return Err(StreamError::RetryLimit {
                    range,
                    attempts: loads,
                });
            }
            loads += 1;
            log::trace!("manager/network: loading {} (#{})", range, loads);

            tokio::select! {
                _ = token.cancelled() => return Err(cancelled()),
                _ = self.shutdown.cancelled() => {
                    return Err(self.terminated_error())
                }
                loaded = self.load_range(range) => loaded?,
            }
        }
    }

    async fn load_range(&self, range: ByteRange) -> Result<()> {
        let _permit = self
            .range_permits
            .acquire()
            .await
            .map_err(|_| self.terminated_error())?;
        self.cache.request_range(range).await
    }

    /// Cancels every pending `ensure` and aborts the chunk cache.
    /// Calling it again has no further effect.
    pub fn terminate(&self, reason: &str) {
        {
            let mut terminated = self
                .terminated
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if terminated.is_some() {
                return;
            }
            *terminated = Some(reason.to_string());
        }
        log::debug!("manager/network: terminating, {}", reason);
        self.shutdown.cancel();
        self.range_permits.close();
        self.cache.abort(reason);
    }

    fn terminated_error(&self) -> StreamError {
        let reason = self
            .terminated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| "Manager was terminated".to_string());
        StreamError::Aborted(reason)
    }

    pub async fn get_page(&self, index: usize) -> Result<M::Page>
    where
        M: DocumentModel,
    {
        self.ensure(|model| model.get_page(index))
            .await
    }
}

fn cancelled() -> StreamError {
    StreamError::Cancelled("ensure was cancelled".to_string())
}

#[async_trait]
impl<M, C> PdfManager for NetworkPdfManager<M, C>
where
    M: Send + Sync,
    C: ChunkCache,
{
    type Model = M;
    type Stream = C::Stream;

    fn model(&self) -> &M {
        &self.model
    }

    async fn ensure<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(&M) -> Result<Availability<T>> + Send,
    {
        let token = CancellationToken::new();
        self.ensure_with(op, &token).await
    }

    async fn request_loaded_stream(&self) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(self.terminated_error()),
            loaded = self.cache.request_all_chunks() => loaded,
        }
    }

    async fn on_loaded_stream(&self) -> Result<C::Stream> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(self.terminated_error()),
            stream = self.cache.on_loaded_stream() => stream,
        }
    }
}
