#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, Once};

use ark_pdf_stream::network::{
    HttpBody, HttpClient, HttpRequest, HttpResponse,
};
use ark_pdf_stream::{Result, StreamConfig};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE,
    RANGE,
};
use url::Url;

pub const PDF_URL: &str = "https://files.example.com/docs/sample.pdf";

static INIT: Once = Once::new();

pub fn initialize() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();
    });
}

/// Deterministic document content of `len` bytes.
pub fn pdf_bytes(len: usize) -> Bytes {
    let header = b"%PDF-1.7\n";
    (0..len)
        .map(|i| match header.get(i) {
            Some(byte) => *byte,
            None => (i % 251) as u8,
        })
        .collect::<Vec<_>>()
        .into()
}

pub fn config() -> StreamConfig {
    StreamConfig::new(Url::parse(PDF_URL).expect("valid url"))
}

/// In-memory HTTP server for a single file.
pub struct MockHttpClient {
    data: Bytes,
    accept_ranges: bool,
    ignore_range: bool,
    content_range_shift: u64,
    omit_content_range: bool,
    hold_body: bool,
    fail_transport: bool,
    not_found: bool,
    piece_size: usize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            accept_ranges: false,
            ignore_range: false,
            content_range_shift: 0,
            omit_content_range: false,
            hold_body: false,
            fail_transport: false,
            not_found: false,
            piece_size: 1000,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ranges(mut self) -> Self {
        self.accept_ranges = true;
        self
    }

    /// Answers range requests with the whole file and status 200.
    pub fn ignoring_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    /// Serves the requested bytes but reports them `shift` bytes later in
    /// `Content-Range`, like a proxy rewriting the range.
    pub fn shifting_content_range(mut self, shift: u64) -> Self {
        self.content_range_shift = shift;
        self
    }

    /// Answers range requests with 206 but no `Content-Range`.
    pub fn omitting_content_range(mut self) -> Self {
        self.omit_content_range = true;
        self
    }

    /// Sends headers but never any body, keeping requests in flight.
    pub fn holding_body(mut self) -> Self {
        self.hold_body = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_transport = true;
        self
    }

    pub fn not_found(mut self) -> Self {
        self.not_found = true;
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `Range` header of every request, `None` for full requests.
    pub fn range_headers(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|request| {
                request
                    .headers
                    .get(RANGE)
                    .map(|value| value.to_str().unwrap().to_string())
            })
            .collect()
    }

    fn response(
        &self,
        status: u16,
        headers: HeaderMap,
        body: Bytes,
    ) -> HttpResponse {
        let pieces = body
            .chunks(self.piece_size)
            .map(|piece| body.slice_ref(piece))
            .collect();
        HttpResponse {
            status,
            headers,
            body: Box::new(MockBody {
                pieces,
                hold: self.hold_body,
            }),
        }
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (first, last) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap()
            .push(request.clone());
        tokio::task::yield_now().await;

        if self.fail_transport {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )
            .into());
        }
        if self.not_found {
            return Ok(self.response(404, HeaderMap::new(), Bytes::new()));
        }

        let total = self.data.len() as u64;
        let mut headers = HeaderMap::new();
        let range = request
            .headers
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_range);

        match range {
            Some((first, last)) if !self.ignore_range => {
                let last = last.min(total - 1);
                let body = self
                    .data
                    .slice(first as usize..=last as usize);
                let value = format!(
                    "bytes {}-{}/{}",
                    first + self.content_range_shift,
                    last + self.content_range_shift,
                    total
                );
                if !self.omit_content_range {
                    headers.insert(
                        CONTENT_RANGE,
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
                Ok(self.response(206, headers, body))
            }
            _ => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(total));
                if self.accept_ranges {
                    headers.insert(
                        ACCEPT_RANGES,
                        HeaderValue::from_static("bytes"),
                    );
                }
                Ok(self.response(200, headers, self.data.clone()))
            }
        }
    }
}

struct MockBody {
    pieces: VecDeque<Bytes>,
    hold: bool,
}

#[async_trait]
impl HttpBody for MockBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>> {
        if self.hold {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        Ok(self.pieces.pop_front())
    }
}
