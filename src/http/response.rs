//! Backend-neutral response written by the action pipeline.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;
use tracing::warn;

/// Body type handed back to hyper by both drivers.
pub type HttpBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Stream of body chunks returned by streaming actions.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Response body.
#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Full(Bytes),
    Stream(ByteStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Full(b) => write!(f, "Full({} bytes)", b.len()),
            ResponseBody::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// HTTP response under construction.
#[derive(Debug)]
pub struct ActionResponse {
    /// HTTP status code. `None` until something decides it.
    pub status: Option<u16>,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: ResponseBody,
    /// Set once an action or middleware has produced the response.
    pub written: bool,
}

impl ActionResponse {
    /// Create an unwritten response with no status.
    pub fn new() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            written: false,
        }
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Effective status code (200 unless set).
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Insert a header, replacing existing values. Invalid input is logged and skipped.
    pub fn set_header(&mut self, key: &str, value: &str) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!("Skipping invalid response header {}: {}", key, value),
        }
    }

    /// Get a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Set the content type unless one was already chosen.
    pub fn default_content_type(&mut self, content_type: &str) {
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.set_header(CONTENT_TYPE.as_str(), content_type);
        }
    }

    /// Write a complete body and mark the response as written.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.body = ResponseBody::Full(body.into());
        self.written = true;
    }

    /// Write a streaming body and mark the response as written.
    pub fn send_stream(&mut self, stream: ByteStream) {
        self.body = ResponseBody::Stream(stream);
        self.written = true;
    }

    /// End the response without a body.
    pub fn end(&mut self) {
        self.body = ResponseBody::Empty;
        self.written = true;
    }

    /// Get the body as text if it is fully buffered.
    pub fn text_body(&self) -> Option<String> {
        match &self.body {
            ResponseBody::Full(b) => Some(String::from_utf8_lossy(b).to_string()),
            _ => None,
        }
    }

    /// Convert into a hyper response. HEAD requests get the headers only.
    pub fn into_hyper(self, head_only: bool) -> hyper::Response<HttpBody> {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or_else(|_| {
            warn!(
                "Invalid status code {}, falling back to 500 Internal Server Error",
                self.status_code()
            );
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let body = match self.body {
            _ if head_only => empty_body(),
            ResponseBody::Empty => empty_body(),
            ResponseBody::Full(bytes) => Full::new(bytes)
                .map_err(|never| match never {})
                .boxed_unsync(),
            ResponseBody::Stream(stream) => {
                StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
            }
        };

        let mut response = hyper::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for ActionResponse {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_body() -> HttpBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}
