use std::fmt;

use crate::{Result, StreamError};

/// Half-open interval `[begin, end)` of a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    begin: u64,
    end: u64,
}

impl ByteRange {
    pub fn new(begin: u64, end: u64) -> Result<Self> {
        if begin >= end {
            return Err(StreamError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn contains(&self, other: &ByteRange) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Value of the `Range` request header, which is inclusive of the last
    /// byte.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.begin, self.end - 1)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Parsed `Content-Range` response header, e.g. `bytes 200-1023/4096`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub begin: u64,
    /// Last byte, inclusive.
    pub last: u64,
    /// `None` when the server answered with `*`.
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = spec.split_once('/')?;
        let (begin, last) = range.split_once('-')?;
        let begin = begin.trim().parse().ok()?;
        let last = last.trim().parse().ok()?;
        if last < begin {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            total => Some(total.parse().ok()?),
        };
        Some(Self { begin, last, total })
    }
}
