//! Byte-range responses
//!
//! Single `Range: bytes=...` requests served from fully buffered `GET` replies. Streams,
//! failures and redirects pass through untouched.

use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};

use crate::encoder::{Encoded, EncodedBody};

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    /// Half-open `[start, end)`.
    Satisfiable(usize, usize),
    Unsatisfiable,
}

/// Parse a single range against a body of `total` bytes.
///
/// Supports `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. `None` means the header
/// is ignored (other unit, several ranges, malformed) and the whole body is served.
fn parse_range(value: &str, total: usize) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (first, last) = spec.split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let suffix: usize = last.parse().ok()?;
        if suffix == 0 || total == 0 {
            return Some(ByteRange::Unsatisfiable);
        }
        return Some(ByteRange::Satisfiable(total.saturating_sub(suffix), total));
    }

    let start: usize = first.parse().ok()?;
    let end = if last.is_empty() {
        total
    } else {
        let last: usize = last.parse().ok()?;
        if last < start {
            return Some(ByteRange::Unsatisfiable);
        }
        // inclusive on the wire
        last.saturating_add(1).min(total)
    };

    if start >= total {
        return Some(ByteRange::Unsatisfiable);
    }
    Some(ByteRange::Satisfiable(start, end))
}

fn set_content_range(headers: &mut HeaderMap, value: String) {
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.insert(header::CONTENT_RANGE, v);
    }
}

/// Answer a `Range` request from an encoded `200` reply to `GET`.
pub fn apply_range(mut encoded: Encoded, method: &Method, range: Option<&HeaderValue>) -> Encoded {
    if method != Method::GET || encoded.status != StatusCode::OK {
        return encoded;
    }
    let bytes = match &encoded.body {
        EncodedBody::Full(bytes) => bytes.clone(),
        _ => return encoded,
    };
    let total = bytes.len();
    encoded
        .headers
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let Some(range) = range
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, total))
    else {
        return encoded;
    };

    match range {
        ByteRange::Satisfiable(start, end) => {
            let part = bytes.slice(start..end);
            encoded.status = StatusCode::PARTIAL_CONTENT;
            set_content_range(
                &mut encoded.headers,
                format!("bytes {}-{}/{}", start, end - 1, total),
            );
            encoded
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(part.len()));
            encoded.body = EncodedBody::Full(part);
        }
        ByteRange::Unsatisfiable => {
            tracing::debug!(total, "Unsatisfiable range request");
            encoded.status = StatusCode::RANGE_NOT_SATISFIABLE;
            set_content_range(&mut encoded.headers, format!("bytes */{}", total));
            encoded.headers.remove(header::CONTENT_LENGTH);
            encoded.body = EncodedBody::Empty;
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::envelope::Reply;
    use bytes::Bytes;
    use futures_util::stream;

    fn digits() -> Encoded {
        encode(Reply::bytes(&b"0123456789"[..]).with_size(10))
    }

    fn ranged(encoded: Encoded, range: &'static str) -> Encoded {
        apply_range(encoded, &Method::GET, Some(&HeaderValue::from_static(range)))
    }

    #[test]
    fn test_parse_range() {
        use ByteRange::*;
        assert_eq!(parse_range("bytes=0-4", 10), Some(Satisfiable(0, 5)));
        assert_eq!(parse_range("bytes=5-", 10), Some(Satisfiable(5, 10)));
        assert_eq!(parse_range("bytes=-3", 10), Some(Satisfiable(7, 10)));
        assert_eq!(parse_range("bytes=-30", 10), Some(Satisfiable(0, 10)));
        assert_eq!(parse_range("bytes=8-99", 10), Some(Satisfiable(8, 10)));
    }

    #[test]
    fn test_parse_range_edge_cases() {
        use ByteRange::*;
        assert_eq!(parse_range("bytes=10-", 10), Some(Unsatisfiable));
        assert_eq!(parse_range("bytes=5-2", 10), Some(Unsatisfiable));
        assert_eq!(parse_range("bytes=-0", 10), Some(Unsatisfiable));
        assert_eq!(parse_range("bytes=0-", 0), Some(Unsatisfiable));

        assert_eq!(parse_range("items=0-4", 10), None);
        assert_eq!(parse_range("bytes=0-1,4-5", 10), None);
        assert_eq!(parse_range("bytes=abc", 10), None);
        assert_eq!(parse_range("bytes=-", 10), None);
    }

    #[test]
    fn single_range_is_partial_content() {
        let encoded = ranged(digits(), "bytes=2-5");
        assert_eq!(encoded.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(encoded.headers[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(encoded.headers[header::CONTENT_LENGTH], "4");
        assert_eq!(encoded.headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(encoded.full_body().unwrap(), &Bytes::from_static(b"2345"));
    }

    #[test]
    fn range_past_the_end_is_416() {
        let encoded = ranged(digits(), "bytes=20-");
        assert_eq!(encoded.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(encoded.headers[header::CONTENT_RANGE], "bytes */10");
        assert!(encoded.headers.get(header::CONTENT_LENGTH).is_none());
        assert!(matches!(encoded.body, EncodedBody::Empty));
    }

    #[test]
    fn multiple_ranges_serve_everything() {
        let encoded = ranged(digits(), "bytes=0-1,4-5");
        assert_eq!(encoded.status, StatusCode::OK);
        assert_eq!(encoded.headers[header::ACCEPT_RANGES], "bytes");
        assert!(encoded.headers.get(header::CONTENT_RANGE).is_none());
        assert_eq!(encoded.full_body().unwrap().len(), 10);
    }

    #[test]
    fn only_buffered_get_200_is_ranged() {
        let post = apply_range(
            digits(),
            &Method::POST,
            Some(&HeaderValue::from_static("bytes=0-1")),
        );
        assert_eq!(post.status, StatusCode::OK);
        assert!(post.headers.get(header::ACCEPT_RANGES).is_none());

        let failure = ranged(
            encode(Reply::text("nope").with_status(StatusCode::NOT_FOUND)),
            "bytes=0-1",
        );
        assert_eq!(failure.status, StatusCode::NOT_FOUND);

        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"abc"))]);
        let streamed = ranged(encode(Reply::stream(chunks)), "bytes=0-1");
        assert_eq!(streamed.status, StatusCode::OK);
        assert!(matches!(streamed.body, EncodedBody::Stream(_)));
    }

    #[test]
    fn no_range_header_only_advertises() {
        let encoded = apply_range(digits(), &Method::GET, None);
        assert_eq!(encoded.status, StatusCode::OK);
        assert_eq!(encoded.headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(encoded.headers[header::CONTENT_LENGTH], "10");
    }
}
