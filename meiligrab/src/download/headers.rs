//! Conditional-request header helpers.

use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG};

/// Parse `Content-Length`; absent or non-numeric values count as 0.
pub fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .map(parse_length)
        .unwrap_or(0)
}

pub(crate) fn parse_length(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}

/// The response ETag with surrounding quotes removed, if present.
pub fn etag(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(strip_quotes)
        .filter(|v| !v.is_empty())
}

/// Remove one pair of surrounding double quotes.
///
/// Weak validators (`W/"..."`) are kept verbatim.
pub fn strip_quotes(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

/// `If-None-Match` value for a stored validator.
pub fn if_none_match(validator: &str) -> String {
    if validator.starts_with("W/") || validator.starts_with('"') {
        validator.to_string()
    } else {
        format!("\"{}\"", validator)
    }
}

/// Whether a response validator shows the remote artifact changed since the
/// stored validator was recorded.
///
/// An empty stored validator or a response without an ETag proves nothing.
pub fn is_stale(stored: &str, received: Option<&str>) -> bool {
    !stored.is_empty() && received.is_some_and(|r| r != stored)
}

/// `Range` value resuming after `existing_length` bytes.
pub fn range_from(existing_length: u64) -> String {
    format!("bytes={}-", existing_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_content_length_missing_or_invalid() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(content_length(&headers), 0);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("104857600"));
        assert_eq!(content_length(&headers), 104_857_600);
    }

    #[test]
    fn test_is_stale() {
        assert!(is_stale("old", Some("new")));
        assert!(!is_stale("same", Some("same")));
        assert!(!is_stale("", Some("new")));
        assert!(!is_stale("old", None));
    }

    #[test]
    fn test_etag_strips_quotes() {
        let mut headers = HeaderMap::new();
        assert_eq!(etag(&headers), None);

        headers.insert(ETAG, HeaderValue::from_static("\"abc123\""));
        assert_eq!(etag(&headers).as_deref(), Some("abc123"));

        headers.insert(ETAG, HeaderValue::from_static("W/\"abc123\""));
        assert_eq!(etag(&headers).as_deref(), Some("W/\"abc123\""));

        headers.insert(ETAG, HeaderValue::from_static("\"\""));
        assert_eq!(etag(&headers), None);
    }

    #[test]
    fn test_if_none_match() {
        assert_eq!(if_none_match("abc123"), "\"abc123\"");
        assert_eq!(if_none_match("W/\"abc123\""), "W/\"abc123\"");
        assert_eq!(if_none_match("\"abc123\""), "\"abc123\"");
    }

    #[test]
    fn test_range_from() {
        assert_eq!(range_from(104_857_600), "bytes=104857600-");
    }

    proptest! {
        #[test]
        fn prop_non_numeric_length_is_zero(raw in "[^0-9]*") {
            prop_assert_eq!(parse_length(&raw), 0);
        }

        #[test]
        fn prop_numeric_length_parses(n in any::<u64>()) {
            prop_assert_eq!(parse_length(&n.to_string()), n);
        }

        #[test]
        fn prop_stored_validator_is_sent_back_quoted(v in "[A-Za-z0-9-]{1,40}") {
            let stored = strip_quotes(&format!("\"{}\"", v));
            prop_assert_eq!(&stored, &v);
            prop_assert_eq!(if_none_match(&stored), format!("\"{}\"", v));
        }
    }
}
