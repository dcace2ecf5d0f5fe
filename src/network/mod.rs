//! HTTP transport: the range-request engine and the [`PdfStream`] built on
//! top of it.
//!
//! [`PdfStream`]: crate::transport::PdfStream

mod http;
mod manager;
mod queue;
mod stream;
mod utils;

pub use http::{HttpBody, HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use manager::{
    DoneEvent, NetworkManager, RequestHandler, RequestId, ResponseHead,
    OK_RESPONSE, PARTIAL_CONTENT_RESPONSE,
};
pub use stream::{NetworkFullReader, NetworkRangeReader, NetworkStream};
pub use utils::{
    extract_filename_from_header, validate_range_request_capabilities,
    RangeCapabilities,
};
