//! Demand-paged access to remote PDF documents.
//!
//! * [`transport`] is the contract every byte source implements.
//! * [`network`] fetches the document over HTTP, in ranges when the server
//!   allows it.
//! * [`proxy`] exposes a stream owned by one thread to code running on
//!   another.
//! * [`manager`] runs document model operations, loading the bytes they
//!   are missing and trying again.

pub mod config;
mod errors;
pub mod manager;
pub mod network;
pub mod proxy;
mod range;
pub mod transport;

pub use config::{ManagerConfig, StreamConfig};
pub use errors::{create_response_status_error, Result, StreamError};
pub use range::{ByteRange, ContentRange};
pub use transport::{
    FullReader, PdfStream, ProgressEvent, ProgressSubscriber, RangeReader,
    ReadResult, ReaderHeaders,
};

/// Bytes fetched per range request unless configured otherwise.
pub const DEFAULT_RANGE_CHUNK_SIZE: u64 = 65536;
