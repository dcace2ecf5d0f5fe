//! Uniform access to a document model whose bytes may still be arriving.
//!
//! Model operations are synchronous and report missing bytes by returning
//! [`Availability::NeedsRange`]. A [`PdfManager`] turns such an operation
//! into a future: the fully loaded variant treats a missing range as an
//! error, the streamed variant loads the range through a [`ChunkCache`]
//! and runs the operation again.

mod local;
mod network;

pub use local::LocalPdfManager;
pub use network::NetworkPdfManager;

use async_trait::async_trait;

use crate::{ByteRange, Result};

/// Result of a model operation that may touch bytes not resident yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability<T> {
    Ready(T),
    /// Running the operation again after `range` is resident must give a
    /// coherent result.
    NeedsRange(ByteRange),
}

impl<T> Availability<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Availability<U> {
        match self {
            Self::Ready(value) => Availability::Ready(f(value)),
            Self::NeedsRange(range) => Availability::NeedsRange(range),
        }
    }
}

/// Tracks which chunks of the remote resource are resident and fetches
/// the others.
#[async_trait]
pub trait ChunkCache: Send + Sync {
    /// Byte-addressable view over the resident chunks.
    type Stream: Clone + Send + Sync;

    /// Resolves once `range` is resident. Requests may be batched, but
    /// nothing is promised about their order.
    async fn request_range(&self, range: ByteRange) -> Result<()>;

    async fn request_all_chunks(&self) -> Result<()>;

    fn get_stream(&self) -> Self::Stream;

    /// Resolves once every chunk is resident.
    async fn on_loaded_stream(&self) -> Result<Self::Stream>;

    fn abort(&self, reason: &str);
}

/// Parsed document exposing its pages.
pub trait DocumentModel: Send + Sync {
    type Page: Send;

    fn get_page(&self, index: usize) -> Result<Availability<Self::Page>>;
}

#[async_trait]
pub trait PdfManager: Send + Sync {
    type Model: Send + Sync;
    type Stream: Send;

    fn model(&self) -> &Self::Model;

    /// Runs `op` against the model until it no longer needs missing bytes.
    ///
    /// Errors returned by `op` are never retried.
    async fn ensure<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(&Self::Model) -> Result<Availability<T>> + Send;

    /// Asks for every remaining byte, for operations that cannot proceed
    /// incrementally.
    async fn request_loaded_stream(&self) -> Result<()>;

    async fn on_loaded_stream(&self) -> Result<Self::Stream>;
}
