use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::errors::create_response_status_error;
use crate::transport::{ProgressEvent, ProgressSubscriber, ReadResult};
use crate::Result;

#[derive(Default)]
struct QueueState {
    chunks: VecDeque<Bytes>,
    done: bool,
    stored_error: Option<u16>,
}

/// Chunks delivered by the engine, waiting to be pulled by a reader.
pub(crate) struct ChunkQueue {
    url: String,
    state: Mutex<QueueState>,
    notify: Notify,
    subscribers: RwLock<Vec<Arc<dyn ProgressSubscriber>>>,
}

impl ChunkQueue {
    pub fn new(url: String) -> Self {
        Self {
            url,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, chunk: Bytes) {
        let mut state = self.state();
        if state.done {
            return;
        }
        state.chunks.push_back(chunk);
        drop(state);
        self.notify.notify_one();
    }

    pub fn finish(&self) {
        self.state().done = true;
        self.notify.notify_one();
    }

    pub fn fail(&self, status: u16) {
        let mut state = self.state();
        if state.done {
            return;
        }
        state.stored_error = Some(status);
        drop(state);
        self.notify.notify_one();
    }

    /// Drops whatever was not read yet. Later reads return `Done`.
    pub fn cancel(&self) {
        let mut state = self.state();
        state.done = true;
        state.chunks.clear();
        state.stored_error = None;
        drop(state);
        self.notify.notify_one();
    }

    /// Finished readers may be forgotten by their stream.
    pub fn is_closed(&self) -> bool {
        let state = self.state();
        state.stored_error.is_some() || (state.done && state.chunks.is_empty())
    }

    pub async fn read(&self) -> Result<ReadResult> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state();
                if let Some(status) = state.stored_error {
                    return Err(create_response_status_error(status, &self.url));
                }
                if let Some(chunk) = state.chunks.pop_front() {
                    return Ok(ReadResult::Data(chunk));
                }
                if state.done {
                    return Ok(ReadResult::Done);
                }
            }
            notified.await;
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    pub fn notify_progress(&self, event: ProgressEvent) {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .for_each(|s| s.notify_progress(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunks_then_done() {
        let queue = ChunkQueue::new("https://example.com/a.pdf".into());
        queue.push(Bytes::from_static(b"abc"));
        queue.finish();
        assert_eq!(
            queue.read().await.unwrap(),
            ReadResult::Data(Bytes::from_static(b"abc"))
        );
        assert!(queue.is_closed());
        assert_eq!(queue.read().await.unwrap(), ReadResult::Done);
        assert_eq!(queue.read().await.unwrap(), ReadResult::Done);
    }

    #[tokio::test]
    async fn waiting_reader_is_woken() {
        let queue =
            Arc::new(ChunkQueue::new("https://example.com/a.pdf".into()));
        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.read().await })
        };
        tokio::task::yield_now().await;
        queue.push(Bytes::from_static(b"late"));
        assert_eq!(
            reader.await.unwrap().unwrap(),
            ReadResult::Data(Bytes::from_static(b"late"))
        );
    }

    #[tokio::test]
    async fn stored_error_is_returned_by_every_read() {
        let queue = ChunkQueue::new("https://example.com/a.pdf".into());
        queue.fail(500);
        assert!(queue.read().await.is_err());
        assert!(queue.read().await.is_err());
    }

    #[tokio::test]
    async fn cancel_discards_pending_chunks() {
        let queue = ChunkQueue::new("https://example.com/a.pdf".into());
        queue.push(Bytes::from_static(b"abc"));
        queue.cancel();
        queue.cancel();
        assert_eq!(queue.read().await.unwrap(), ReadResult::Done);
        queue.push(Bytes::from_static(b"ignored"));
        assert_eq!(queue.read().await.unwrap(), ReadResult::Done);
    }
}
