//! S3 Responses
//!
//! Error-to-status mapping, XML error bodies and `Range` header parsing.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};

use crate::error::{Error, Result};

/// Body type of every server response
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// S3 error code and HTTP status for an error
pub fn api_error(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::InvalidBucketName(_) => (StatusCode::BAD_REQUEST, "InvalidBucketName"),
        Error::InvalidObjectName { .. } => (StatusCode::BAD_REQUEST, "XMinioInvalidObjectName"),
        Error::InvalidRange { .. } => (StatusCode::RANGE_NOT_SATISFIABLE, "InvalidRange"),
        Error::BucketNotFound(_) => (StatusCode::NOT_FOUND, "NoSuchBucket"),
        Error::ObjectNotFound { .. } => (StatusCode::NOT_FOUND, "NoSuchKey"),
        Error::BucketExists(_) => (StatusCode::CONFLICT, "BucketAlreadyOwnedByYou"),
        Error::ReadQuorum { .. } => (StatusCode::SERVICE_UNAVAILABLE, "XMinioReadQuorum"),
        Error::WriteQuorum { .. } => (StatusCode::SERVICE_UNAVAILABLE, "XMinioWriteQuorum"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
    }
}

/// Escape text for inclusion in an XML element
fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render an S3 `<Error>` document
pub fn error_xml(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Error><Code>{}</Code><Message>{}</Message><Resource>{}</Resource>\
         <RequestId>{}</RequestId></Error>",
        xml_escape(code),
        xml_escape(message),
        xml_escape(resource),
        xml_escape(request_id)
    )
}

pub fn header_value(raw: &str) -> HeaderValue {
    HeaderValue::from_str(raw).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Response with a status and a body
pub fn respond(status: StatusCode, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
    let mut response = respond(status, full(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// S3 XML error response
pub fn s3_error(
    status: StatusCode,
    code: &str,
    message: &str,
    resource: &str,
    request_id: &str,
) -> Response<ResponseBody> {
    let mut response = respond(status, full(error_xml(code, message, resource, request_id)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    headers.insert("x-amz-request-id", header_value(request_id));
    response
}

/// S3 XML error response for a library error
pub fn error_response(err: &Error, resource: &str, request_id: &str) -> Response<ResponseBody> {
    let (status, code) = api_error(err);
    s3_error(status, code, &err.to_string(), resource, request_id)
}

/// Parse a single-range `Range` header against an object of `size` bytes.
///
/// Returns the `(offset, length)` window, `None` when the header should be
/// ignored (not `bytes=`, multiple ranges, malformed), or `InvalidRange`
/// when the range is well-formed but unsatisfiable.
pub fn parse_range(raw: &str, size: i64) -> Result<Option<(i64, i64)>> {
    let spec = match raw.trim().strip_prefix("bytes=") {
        Some(spec) if !spec.contains(',') => spec.trim(),
        _ => return Ok(None),
    };
    let (first, last) = match spec.split_once('-') {
        Some(parts) => parts,
        None => return Ok(None),
    };

    let unsatisfiable = |offset: i64, length: i64| Error::InvalidRange {
        offset,
        length,
        size,
    };

    match (first.trim(), last.trim()) {
        ("", "") => Ok(None),
        // bytes=-n: the last n bytes
        ("", suffix) => {
            let Ok(n) = suffix.parse::<i64>() else {
                return Ok(None);
            };
            if n <= 0 || size == 0 {
                return Err(unsatisfiable(size, 0));
            }
            let length = n.min(size);
            Ok(Some((size - length, length)))
        }
        // bytes=a-: from a to the end
        (start, "") => {
            let Ok(start) = start.parse::<i64>() else {
                return Ok(None);
            };
            if start >= size {
                return Err(unsatisfiable(start, 0));
            }
            Ok(Some((start, size - start)))
        }
        // bytes=a-b: inclusive, b clamped to the last byte
        (start, end) => {
            let (Ok(start), Ok(end)) = (start.parse::<i64>(), end.parse::<i64>()) else {
                return Ok(None);
            };
            if end < start {
                return Ok(None);
            }
            if start >= size {
                return Err(unsatisfiable(start, end - start + 1));
            }
            let end = end.min(size - 1);
            Ok(Some((start, end - start + 1)))
        }
    }
}

/// `Content-Range` value for a served window
pub fn content_range(offset: i64, length: i64, size: i64) -> String {
    format!("bytes {}-{}/{}", offset, offset + length - 1, size)
}
