//! S3 API Handlers
//!
//! Path-style routing:
//!
//! | Method | Path            | Operation        |
//! |--------|-----------------|------------------|
//! | GET    | `/`             | list buckets     |
//! | PUT    | `/bucket`       | make bucket      |
//! | PUT    | `/bucket/key`   | put object       |
//! | HEAD   | `/bucket/key`   | object info      |
//! | GET    | `/bucket/key`   | get object       |
//! | DELETE | `/bucket/key`   | delete object    |

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::response::{
    content_range, empty, error_response, header_value, parse_range, respond, s3_error, text,
    ResponseBody,
};
use super::ServerState;
use crate::error::{Error, Result};
use crate::object_layer::ObjectLayer;
use crate::storage::{ObjectDescriptor, READ_CHUNK_SIZE};

/// Route an S3 API request
pub async fn handle<B>(state: Arc<ServerState>, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let method = req.method().clone();
    let resource = req.uri().path().to_string();

    state.metrics().request_started();
    let mut response = if state.is_shutting_down() {
        s3_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "ServiceUnavailable",
            "Server is shutting down",
            &resource,
            &request_id,
        )
    } else {
        match route(&state, req).await {
            Ok(response) => response,
            Err(err) => {
                if err.is_client_error() {
                    debug!(%method, %resource, error = %err, "Request rejected");
                } else {
                    warn!(%method, %resource, error = %err, "Request failed");
                }
                error_response(&err, &resource, &request_id)
            }
        }
    };
    state.metrics().request_finished();
    state
        .metrics()
        .record_request(method.as_str(), response.status().as_u16());

    response
        .headers_mut()
        .insert("x-amz-request-id", header_value(&request_id));
    response
}

/// Split a request path into decoded bucket and object names
fn split_path(path: &str) -> Result<(String, Option<String>)> {
    let decoded = urlencoding::decode(path.trim_start_matches('/'))
        .map_err(|e| Error::Unexpected(format!("path is not valid UTF-8: {}", e)))?;

    match decoded.split_once('/') {
        Some((bucket, "")) => Ok((bucket.to_string(), None)),
        Some((bucket, object)) => Ok((bucket.to_string(), Some(object.to_string()))),
        None => Ok((decoded.into_owned(), None)),
    }
}

async fn route<B>(state: &Arc<ServerState>, req: Request<B>) -> Result<Response<ResponseBody>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    let (bucket, object) = split_path(req.uri().path())?;

    match (req.method(), bucket.is_empty(), object) {
        (&Method::GET, true, None) => list_buckets(state).await,
        (&Method::PUT, false, None) => make_bucket(state, &bucket).await,
        (&Method::PUT, false, Some(object)) => put_object(state, &bucket, &object, req).await,
        (&Method::HEAD, false, Some(object)) => head_object(state, &bucket, &object).await,
        (&Method::GET, false, Some(object)) => {
            let range = req
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            get_object(state, &bucket, &object, range.as_deref()).await
        }
        (&Method::DELETE, false, Some(object)) => delete_object(state, &bucket, &object).await,
        _ => Ok(s3_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowed",
            "The specified method is not allowed against this resource.",
            req.uri().path(),
            "",
        )),
    }
}

// =============================================================================
// Bucket Operations
// =============================================================================

async fn list_buckets(state: &ServerState) -> Result<Response<ResponseBody>> {
    let buckets = state.store().list_buckets().await?;
    let mut body = buckets.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    Ok(text(StatusCode::OK, body))
}

async fn make_bucket(state: &ServerState, bucket: &str) -> Result<Response<ResponseBody>> {
    state.store().make_bucket(bucket).await?;
    let mut response = respond(StatusCode::OK, empty());
    response
        .headers_mut()
        .insert(header::LOCATION, header_value(&format!("/{}", bucket)));
    Ok(response)
}

// =============================================================================
// Object Operations
// =============================================================================

fn object_headers(response: &mut Response<ResponseBody>, info: &ObjectDescriptor) {
    let headers = response.headers_mut();
    headers.insert(header::ETAG, header_value(&format!("\"{}\"", info.etag)));
    headers.insert(
        header::LAST_MODIFIED,
        header_value(&info.mod_time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
}

async fn put_object<B>(
    state: &ServerState,
    bucket: &str,
    object: &str,
    req: Request<B>,
) -> Result<Response<ResponseBody>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    let data = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?
        .to_bytes();

    let info = state.store().put_object(bucket, object, data).await?;
    let mut response = respond(StatusCode::OK, empty());
    response
        .headers_mut()
        .insert(header::ETAG, header_value(&format!("\"{}\"", info.etag)));
    Ok(response)
}

async fn head_object(
    state: &ServerState,
    bucket: &str,
    object: &str,
) -> Result<Response<ResponseBody>> {
    let info = state.store().get_object_info(bucket, object).await?;
    let mut response = respond(StatusCode::OK, empty());
    object_headers(&mut response, &info);
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    Ok(response)
}

async fn get_object(
    state: &Arc<ServerState>,
    bucket: &str,
    object: &str,
    range: Option<&str>,
) -> Result<Response<ResponseBody>> {
    let info = state.store().get_object_info(bucket, object).await?;
    let window = match range {
        Some(raw) => parse_range(raw, info.size)?,
        None => None,
    };
    let (offset, length) = window.unwrap_or((0, info.size));

    // The object is streamed by a separate task through an in-memory pipe;
    // the task's verdict is appended to the body so a mid-stream failure
    // aborts the response instead of truncating it silently.
    let (mut writer, reader) = tokio::io::duplex(READ_CHUNK_SIZE);
    let (done_tx, done_rx) = oneshot::channel::<Result<()>>();
    let task_state = state.clone();
    let (task_bucket, task_object) = (bucket.to_string(), object.to_string());
    tokio::spawn(async move {
        let result = task_state
            .store()
            .get_object(&task_bucket, &task_object, offset, length, Some(&mut writer))
            .await;
        match &result {
            Ok(()) => task_state.metrics().record_bytes_sent(length as u64),
            Err(err) => warn!(
                bucket = %task_bucket,
                object = %task_object,
                error = %err,
                "Object stream failed"
            ),
        }
        let _ = done_tx.send(result);
    });

    let verdict = stream::once(async move {
        match done_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Err(io::Error::new(io::ErrorKind::Other, err.to_string()))),
            Err(_) => Some(Err(io::Error::new(
                io::ErrorKind::Other,
                "object stream task ended without a result",
            ))),
        }
    })
    .filter_map(futures::future::ready);

    let frames = ReaderStream::with_capacity(reader, READ_CHUNK_SIZE)
        .chain(verdict)
        .map_ok(Frame::data);
    let body = StreamBody::new(frames).boxed_unsync();

    let status = if window.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut response = respond(status, body);
    object_headers(&mut response, &info);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if window.is_some() {
        headers.insert(
            header::CONTENT_RANGE,
            header_value(&content_range(offset, length, info.size)),
        );
    }
    Ok(response)
}

async fn delete_object(
    state: &ServerState,
    bucket: &str,
    object: &str,
) -> Result<Response<ResponseBody>> {
    state.store().delete_object(bucket, object).await?;
    Ok(respond(StatusCode::NO_CONTENT, empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/").unwrap(), (String::new(), None));
        assert_eq!(split_path("/bucket").unwrap(), ("bucket".to_string(), None));
        assert_eq!(split_path("/bucket/").unwrap(), ("bucket".to_string(), None));
        assert_eq!(
            split_path("/bucket/dir/key%20name").unwrap(),
            ("bucket".to_string(), Some("dir/key name".to_string()))
        );
    }
}
