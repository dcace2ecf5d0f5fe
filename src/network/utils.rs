use reqwest::header::{
    HeaderMap, HeaderName, ACCEPT_RANGES, CONTENT_DISPOSITION,
    CONTENT_ENCODING, CONTENT_LENGTH,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeCapabilities {
    pub allow_range_requests: bool,
    pub suggested_length: Option<u64>,
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}

/// Decides from the headers of a full response whether the rest of the file
/// may be fetched with range requests.
///
/// Small files are not worth splitting, so ranges are only allowed above
/// two chunks.
pub fn validate_range_request_capabilities(
    headers: &HeaderMap,
    is_http: bool,
    range_chunk_size: u64,
    disable_range: bool,
) -> RangeCapabilities {
    let mut capabilities = RangeCapabilities::default();

    let Some(length) = header(headers, CONTENT_LENGTH)
        .and_then(|value| value.trim().parse::<u64>().ok())
    else {
        return capabilities;
    };
    capabilities.suggested_length = Some(length);

    if length <= 2 * range_chunk_size {
        return capabilities;
    }
    if disable_range || !is_http {
        return capabilities;
    }
    if header(headers, ACCEPT_RANGES) != Some("bytes") {
        return capabilities;
    }
    let encoding = header(headers, CONTENT_ENCODING).unwrap_or("identity");
    if encoding != "identity" {
        return capabilities;
    }

    capabilities.allow_range_requests = true;
    capabilities
}

/// File name announced by `Content-Disposition`, kept only when it names a
/// PDF.
pub fn extract_filename_from_header(headers: &HeaderMap) -> Option<String> {
    let disposition = header(headers, CONTENT_DISPOSITION)?;
    let filename = disposition
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("filename")
                .then(|| value.trim().trim_matches('"').to_string())
        })?;

    let filename = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string();
    if filename
        .to_ascii_lowercase()
        .ends_with(".pdf")
    {
        Some(filename)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[rstest]
    #[case(&[("content-length", "8192"), ("accept-ranges", "bytes")], true, false, true)]
    #[case(&[("content-length", "8192"), ("accept-ranges", "bytes")], true, true, false)]
    #[case(&[("content-length", "8192"), ("accept-ranges", "bytes")], false, false, false)]
    #[case(&[("content-length", "8192"), ("accept-ranges", "none")], true, false, false)]
    #[case(&[("content-length", "8192")], true, false, false)]
    #[case(&[("content-length", "2048"), ("accept-ranges", "bytes")], true, false, false)]
    #[case(&[("content-length", "8192"), ("accept-ranges", "bytes"), ("content-encoding", "gzip")], true, false, false)]
    #[case(&[("content-length", "8192"), ("accept-ranges", "bytes"), ("content-encoding", "identity")], true, false, true)]
    fn range_capabilities(
        #[case] pairs: &[(&'static str, &'static str)],
        #[case] is_http: bool,
        #[case] disable_range: bool,
        #[case] allowed: bool,
    ) {
        let capabilities = validate_range_request_capabilities(
            &headers(pairs),
            is_http,
            1024,
            disable_range,
        );
        assert_eq!(capabilities.allow_range_requests, allowed);
    }

    #[test]
    fn suggested_length_without_ranges() {
        let capabilities = validate_range_request_capabilities(
            &headers(&[("content-length", "100")]),
            true,
            1024,
            false,
        );
        assert_eq!(capabilities.suggested_length, Some(100));
        assert!(!capabilities.allow_range_requests);

        let capabilities = validate_range_request_capabilities(
            &headers(&[("content-length", "lots")]),
            true,
            1024,
            false,
        );
        assert_eq!(capabilities, RangeCapabilities::default());
    }

    #[rstest]
    #[case("attachment; filename=\"report.pdf\"", Some("report.pdf"))]
    #[case("inline; filename=dir/Scan.PDF", Some("Scan.PDF"))]
    #[case("attachment; filename=\"notes.txt\"", None)]
    #[case("inline", None)]
    fn filename_from_disposition(
        #[case] disposition: &'static str,
        #[case] expected: Option<&str>,
    ) {
        let map = headers(&[("content-disposition", disposition)]);
        assert_eq!(
            extract_filename_from_header(&map).as_deref(),
            expected
        );
    }
}
