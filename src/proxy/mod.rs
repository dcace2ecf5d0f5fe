//! Lets code without transport access drive a [`PdfStream`] owned by a
//! privileged context.
//!
//! The two halves only share channels, so the host can run on another
//! thread or runtime:
//!
//! ```no_run
//! # use ark_pdf_stream::{network::NetworkStream, proxy, StreamConfig};
//! # async fn demo(config: StreamConfig) -> ark_pdf_stream::Result<()> {
//! let (stream, host) = proxy::channel(NetworkStream::new(config)?);
//! tokio::spawn(host.run());
//! # drop(stream);
//! # Ok(())
//! # }
//! ```

mod host;
mod message;
mod stream;

pub use host::StreamHost;
pub use message::{
    CancelMessage, HeadersMessage, ReaderMessage, StreamEnvelope,
    StreamRequest,
};
pub use stream::{
    ProxyFullReader, ProxyRangeReader, ProxyStream, DEFAULT_CHUNK_CAPACITY,
};

use tokio::sync::mpsc;

use crate::transport::PdfStream;

/// Connects a worker-side [`ProxyStream`] to a [`StreamHost`] owning
/// `source`.
pub fn channel<S: PdfStream + 'static>(source: S) -> (ProxyStream, StreamHost<S>) {
    channel_with_capacity(source, DEFAULT_CHUNK_CAPACITY)
}

pub fn channel_with_capacity<S: PdfStream + 'static>(
    source: S,
    chunk_capacity: usize,
) -> (ProxyStream, StreamHost<S>) {
    let (port, inbox) = mpsc::unbounded_channel();
    (
        ProxyStream::new(port, chunk_capacity),
        StreamHost::new(source, inbox),
    )
}
