use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, DEFAULT_RANGE_CHUNK_SIZE};

/// Parameters of a remote PDF source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub url: Url,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub http_headers: Vec<(String, String)>,
    #[serde(default = "default_range_chunk_size")]
    pub range_chunk_size: u64,
    #[serde(default)]
    pub disable_range: bool,
    /// Accepted so existing configurations keep loading. The network
    /// transport delivers each response whole and never streams, so this
    /// flag changes nothing.
    #[serde(default)]
    pub disable_stream: bool,
    /// Total length, when the caller already knows it.
    #[serde(default)]
    pub length: Option<u64>,
}

fn default_range_chunk_size() -> u64 {
    DEFAULT_RANGE_CHUNK_SIZE
}

impl StreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            http_headers: Vec::new(),
            range_chunk_size: DEFAULT_RANGE_CHUNK_SIZE,
            disable_range: false,
            disable_stream: false,
            length: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.http_headers
            .push((name.into(), value.into()));
        self
    }

    pub fn with_range_chunk_size(mut self, range_chunk_size: u64) -> Self {
        self.range_chunk_size = range_chunk_size;
        self
    }

    pub fn with_disable_range(mut self, disable_range: bool) -> Self {
        self.disable_range = disable_range;
        self
    }

    pub fn with_disable_stream(mut self, disable_stream: bool) -> Self {
        self.disable_stream = disable_stream;
        self
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub(crate) fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.http_headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(headers)
    }
}

/// Limits of the fault-driven retry loop in
/// [`NetworkPdfManager`](crate::manager::NetworkPdfManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Fault-driven range loads allowed to be outstanding at once.
    #[serde(default = "default_max_concurrent_ranges")]
    pub max_concurrent_ranges: usize,
    /// Chunk loads a single `ensure` may wait for before giving up.
    #[serde(default = "default_max_fault_retries")]
    pub max_fault_retries: usize,
}

fn default_max_concurrent_ranges() -> usize {
    6
}

fn default_max_fault_retries() -> usize {
    1024
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ranges: default_max_concurrent_ranges(),
            max_fault_retries: default_max_fault_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_json() {
        let config =
            StreamConfig::from_json(r#"{"url": "https://example.com/a.pdf"}"#)
                .unwrap();
        assert_eq!(config.range_chunk_size, DEFAULT_RANGE_CHUNK_SIZE);
        assert!(!config.disable_range);
        assert!(!config.disable_stream);
        assert_eq!(config.length, None);
        assert!(config.is_http());
    }

    #[test]
    fn full_json() {
        let config = StreamConfig::from_json(
            r#"{
                "url": "file:///tmp/a.pdf",
                "http_headers": [["Authorization", "Bearer x"]],
                "range_chunk_size": 1024,
                "disable_range": true,
                "disable_stream": true,
                "length": 4096
            }"#,
        )
        .unwrap();
        assert!(!config.is_http());
        assert_eq!(config.range_chunk_size, 1024);
        assert_eq!(config.length, Some(4096));
        let headers = config.header_map().unwrap();
        assert_eq!(headers["authorization"], "Bearer x");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            StreamConfig::from_json("{\"url\": 1}"),
            Err(crate::StreamError::Parse)
        ));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let config =
            StreamConfig::new(Url::parse("https://example.com/a.pdf").unwrap())
                .with_header("Bad Header", "x");
        assert!(config.header_map().is_err());
    }

    #[test]
    fn manager_defaults() {
        let config: ManagerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.max_concurrent_ranges, 6);
    }
}
