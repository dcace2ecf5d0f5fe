use async_trait::async_trait;
use bytes::Bytes;

use super::{Availability, DocumentModel, PdfManager};
use crate::{Result, StreamError};

/// Manager over a document whose bytes are all in memory.
pub struct LocalPdfManager<M> {
    model: M,
    stream: Bytes,
}

impl<M: Send + Sync> LocalPdfManager<M> {
    pub fn new(data: impl Into<Bytes>, build: impl FnOnce(Bytes) -> M) -> Self {
        let stream = data.into();
        let model = build(stream.clone());
        Self { model, stream }
    }

    pub async fn get_page(&self, index: usize) -> Result<M::Page>
    where
        M: DocumentModel,
    {
        self.ensure(|model| model.get_page(index))
            .await
    }
}

#[async_trait]
impl<M: Send + Sync> PdfManager for LocalPdfManager<M> {
    type Model = M;
    type Stream = Bytes;

    fn model(&self) -> &M {
        &self.model
    }

    async fn ensure<T, F>(&self, mut op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(&M) -> Result<Availability<T>> + Send,
    {
        match op(&self.model)? {
            Availability::Ready(value) => Ok(value),
            Availability::NeedsRange(range) => {
                log::error!("manager/local: missing bytes {}", range);
                Err(StreamError::MissingData(range))
            }
        }
    }

    async fn request_loaded_stream(&self) -> Result<()> {
        Ok(())
    }

    async fn on_loaded_stream(&self) -> Result<Bytes> {
        Ok(self.stream.clone())
    }
}
